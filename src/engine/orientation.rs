//! EXIF orientation handling.
//!
//! Orientation is read from the source bytes at load time and applied as a
//! rotate + optional mirror. Values outside 1..=8 are treated as upright.

/// Rotation and mirroring equivalent to one EXIF orientation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrientationTransform {
    /// Clockwise quarter turns to apply.
    pub quarter_turns: u8,
    /// Mirror horizontally after rotating.
    pub flip_x: bool,
}

impl OrientationTransform {
    pub const IDENTITY: OrientationTransform = OrientationTransform {
        quarter_turns: 0,
        flip_x: false,
    };

    pub fn is_identity(&self) -> bool {
        self.quarter_turns == 0 && !self.flip_x
    }
}

/// Map an EXIF orientation value (1..=8) to its transform.
pub fn transform_for(orientation: u16) -> OrientationTransform {
    match orientation {
        2 => OrientationTransform {
            quarter_turns: 0,
            flip_x: true,
        },
        3 => OrientationTransform {
            quarter_turns: 2,
            flip_x: false,
        },
        4 => OrientationTransform {
            quarter_turns: 2,
            flip_x: true,
        },
        5 => OrientationTransform {
            quarter_turns: 1,
            flip_x: true,
        },
        6 => OrientationTransform {
            quarter_turns: 1,
            flip_x: false,
        },
        7 => OrientationTransform {
            quarter_turns: 3,
            flip_x: true,
        },
        8 => OrientationTransform {
            quarter_turns: 3,
            flip_x: false,
        },
        _ => OrientationTransform::IDENTITY,
    }
}

/// Read the EXIF orientation tag from raw image bytes, 1 when absent.
pub fn read_orientation(data: &[u8]) -> u16 {
    let mut cursor = std::io::Cursor::new(data);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .map(|v| v as u16)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_values() {
        assert!(transform_for(1).is_identity());
        assert!(transform_for(0).is_identity());
        assert!(transform_for(9).is_identity());
    }

    #[test]
    fn test_rotation_values() {
        assert_eq!(transform_for(6).quarter_turns, 1);
        assert!(!transform_for(6).flip_x);
        assert_eq!(transform_for(3).quarter_turns, 2);
        assert_eq!(transform_for(8).quarter_turns, 3);
    }

    #[test]
    fn test_mirrored_values() {
        assert!(transform_for(2).flip_x);
        assert_eq!(transform_for(2).quarter_turns, 0);
        assert!(transform_for(5).flip_x);
        assert_eq!(transform_for(5).quarter_turns, 1);
    }

    #[test]
    fn test_read_orientation_from_non_exif_data() {
        assert_eq!(read_orientation(b"not an image"), 1);
    }
}
