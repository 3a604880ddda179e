//! Frame-accurate timecode arithmetic.
//!
//! All conversions between seconds, frame counts and `HH:MM:SS:FF` labels go
//! through exact integer math on frame counts; floating point seconds only
//! appear at the API boundary so long programs cannot accumulate drift.

use thiserror::Error;

/// Errors produced by timecode parsing and validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimecodeError {
    /// The label does not match `HH:MM:SS[:;]FF`.
    #[error("malformed timecode label {0:?}")]
    Malformed(String),
    /// A field exceeds its legal range for the frame rate.
    #[error("timecode field out of range in {0:?}")]
    OutOfRange(String),
    /// A drop-frame label names a frame number that is skipped.
    #[error("illegal drop-frame timecode {0}: frames 0-{1} do not exist at this minute")]
    IllegalDropFrame(String, u8),
    /// Drop-frame was requested for a rate that cannot drop frames.
    #[error("frame rate {0} has no drop-frame counting scheme")]
    DropFrameUnsupported(String),
}

/// An exact rational frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    pub const F23_976: FrameRate = FrameRate { num: 24000, den: 1001 };
    pub const F24: FrameRate = FrameRate { num: 24, den: 1 };
    pub const F25: FrameRate = FrameRate { num: 25, den: 1 };
    pub const F29_97: FrameRate = FrameRate { num: 30000, den: 1001 };
    pub const F30: FrameRate = FrameRate { num: 30, den: 1 };
    pub const F50: FrameRate = FrameRate { num: 50, den: 1 };
    pub const F59_94: FrameRate = FrameRate { num: 60000, den: 1001 };
    pub const F60: FrameRate = FrameRate { num: 60, den: 1 };

    /// All rates the codec recognizes.
    pub const ALL: [FrameRate; 8] = [
        Self::F23_976,
        Self::F24,
        Self::F25,
        Self::F29_97,
        Self::F30,
        Self::F50,
        Self::F59_94,
        Self::F60,
    ];

    /// Match a floating point fps value against the rate table.
    pub fn from_fps(fps: f64) -> Option<FrameRate> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| (r.as_f64() - fps).abs() < 0.01)
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// The integer frame count used by timecode labels (24, 25, 30, ...).
    pub fn nominal(self) -> u32 {
        (self.num + self.den / 2) / self.den
    }

    /// NTSC-family rates are the only ones that may use drop-frame labels.
    pub fn is_ntsc(self) -> bool {
        self.den == 1001
    }

    /// Drop-frame counting is only defined for the 30- and 60-nominal NTSC
    /// rates. 23.976 is NTSC but has no drop scheme.
    pub fn supports_drop_frame(self) -> bool {
        self.is_ntsc() && self.nominal() % 30 == 0
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Round a time in seconds to a frame count.
    pub fn seconds_to_frames(self, seconds: f64) -> u64 {
        (seconds * f64::from(self.num) / f64::from(self.den)).round() as u64
    }

    /// The exact time in seconds of a frame count.
    pub fn frames_to_seconds(self, frames: u64) -> f64 {
        frames as f64 * f64::from(self.den) / f64::from(self.num)
    }

    /// Frames skipped per drop minute: 2 at 29.97, 4 at 59.94.
    fn dropped_per_minute(self) -> u64 {
        u64::from(self.nominal()) / 15
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{:.2}", self.as_f64())
        }
    }
}

/// A parsed timecode label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl std::fmt::Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}

impl Timecode {
    /// Parse `HH:MM:SS:FF` or `HH:MM:SS;FF`. The frame-field delimiter
    /// decides the drop-frame flag.
    pub fn parse(label: &str) -> Result<Timecode, TimecodeError> {
        let malformed = || TimecodeError::Malformed(label.to_string());
        let bytes = label.as_bytes();
        if bytes.len() != 11 || !label.is_ascii() || bytes[2] != b':' || bytes[5] != b':' {
            return Err(malformed());
        }
        let drop_frame = match bytes[8] {
            b':' => false,
            b';' => true,
            _ => return Err(malformed()),
        };
        let field = |s: &str| s.parse::<u8>().map_err(|_| malformed());
        let tc = Timecode {
            hours: field(&label[0..2])?,
            minutes: field(&label[3..5])?,
            seconds: field(&label[6..8])?,
            frames: field(&label[9..11])?,
            drop_frame,
        };
        if tc.hours > 23 || tc.minutes > 59 || tc.seconds > 59 {
            return Err(TimecodeError::OutOfRange(label.to_string()));
        }
        Ok(tc)
    }

    /// Reject labels naming frames that drop-frame counting skips.
    ///
    /// At drop-frame rates, frame numbers below the drop count are illegal
    /// at the start of every minute that is not a multiple of ten. Fails
    /// rather than silently rounding to the next legal frame.
    pub fn assert_legal_drop_frame(&self, rate: FrameRate) -> Result<(), TimecodeError> {
        if !self.drop_frame {
            return Ok(());
        }
        if !rate.supports_drop_frame() {
            return Err(TimecodeError::DropFrameUnsupported(rate.to_string()));
        }
        let dropped = rate.dropped_per_minute() as u8;
        if self.seconds == 0 && self.minutes % 10 != 0 && self.frames < dropped {
            return Err(TimecodeError::IllegalDropFrame(self.to_string(), dropped - 1));
        }
        Ok(())
    }

    /// The absolute frame index of this label.
    pub fn to_frames(&self, rate: FrameRate) -> Result<u64, TimecodeError> {
        let nominal = u64::from(rate.nominal());
        if u64::from(self.frames) >= nominal {
            return Err(TimecodeError::OutOfRange(self.to_string()));
        }
        self.assert_legal_drop_frame(rate)?;
        let total_seconds =
            3600 * u64::from(self.hours) + 60 * u64::from(self.minutes) + u64::from(self.seconds);
        let mut frames = total_seconds * nominal + u64::from(self.frames);
        if self.drop_frame {
            let total_minutes = 60 * u64::from(self.hours) + u64::from(self.minutes);
            frames -= rate.dropped_per_minute() * (total_minutes - total_minutes / 10);
        }
        Ok(frames)
    }

    /// The label for an absolute frame index.
    pub fn from_frames(frame: u64, rate: FrameRate, drop_frame: bool) -> Timecode {
        let nominal = u64::from(rate.nominal());
        let (total_minutes, frame_in_minute) = if drop_frame {
            let dropped = rate.dropped_per_minute();
            let per_minute = 60 * nominal - dropped;
            let per_ten = 600 * nominal - 9 * dropped;
            let tens = frame / per_ten;
            let rem = frame % per_ten;
            // Minute 0 of each block of ten keeps all its frames; the other
            // nine start counting at the drop offset.
            if rem < 60 * nominal {
                (tens * 10, rem)
            } else {
                let rem = rem - 60 * nominal;
                (tens * 10 + 1 + rem / per_minute, rem % per_minute + dropped)
            }
        } else {
            (frame / (60 * nominal), frame % (60 * nominal))
        };
        Timecode {
            hours: ((total_minutes / 60) % 24) as u8,
            minutes: (total_minutes % 60) as u8,
            seconds: (frame_in_minute / nominal) as u8,
            frames: (frame_in_minute % nominal) as u8,
            drop_frame,
        }
    }
}

/// Format an absolute frame index as a timecode label.
pub fn format_frames(frame: u64, rate: FrameRate, drop_frame: bool) -> String {
    Timecode::from_frames(frame, rate, drop_frame).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_table() {
        assert_eq!(FrameRate::from_fps(29.97), Some(FrameRate::F29_97));
        assert_eq!(FrameRate::from_fps(24.0), Some(FrameRate::F24));
        assert_eq!(FrameRate::from_fps(48.0), None);
        assert_eq!(FrameRate::F29_97.nominal(), 30);
        assert_eq!(FrameRate::F23_976.nominal(), 24);
        assert!(FrameRate::F59_94.is_ntsc());
        assert!(!FrameRate::F25.is_ntsc());
    }

    #[test]
    fn drop_frame_legality() {
        let rate = FrameRate::F29_97;
        assert!(Timecode::parse("00:01:00;00").unwrap().to_frames(rate).is_err());
        assert!(Timecode::parse("00:01:00;01").unwrap().to_frames(rate).is_err());
        assert!(Timecode::parse("00:01:00;02").unwrap().to_frames(rate).is_ok());
        assert!(Timecode::parse("00:10:00;00").unwrap().to_frames(rate).is_ok());
    }

    #[test]
    fn drop_frame_rejected_at_23_976() {
        let tc = Timecode::parse("00:00:01;00").unwrap();
        assert_eq!(
            tc.assert_legal_drop_frame(FrameRate::F23_976),
            Err(TimecodeError::DropFrameUnsupported(FrameRate::F23_976.to_string()))
        );
        assert!(tc.to_frames(FrameRate::F23_976).is_err());
        assert!(tc.to_frames(FrameRate::F25).is_err());
        assert!(tc.assert_legal_drop_frame(FrameRate::F29_97).is_ok());
        assert!(tc.assert_legal_drop_frame(FrameRate::F59_94).is_ok());
        // Non-drop labels are unaffected.
        let ndf = Timecode::parse("00:00:01:00").unwrap();
        assert!(ndf.to_frames(FrameRate::F23_976).is_ok());
    }

    #[test]
    fn drop_frame_round_trip_is_exact() {
        let rate = FrameRate::F29_97;
        for frame in [0, 1, 1799, 1800, 17982, 107_892, 2_589_407] {
            let tc = Timecode::from_frames(frame, rate, true);
            assert_eq!(tc.to_frames(rate).unwrap(), frame, "frame {frame} label {tc}");
        }
    }

    #[test]
    fn drop_frame_minute_boundary() {
        let rate = FrameRate::F29_97;
        // Frame 1800 is one minute in: labels jump from 00:00:59;29 to
        // 00:01:00;02.
        assert_eq!(Timecode::from_frames(1799, rate, true).to_string(), "00:00:59;29");
        assert_eq!(Timecode::from_frames(1800, rate, true).to_string(), "00:01:00;02");
        // The tenth minute keeps frames 0 and 1.
        let ten_min = Timecode::parse("00:10:00;00").unwrap().to_frames(rate).unwrap();
        assert_eq!(Timecode::from_frames(ten_min, rate, true).to_string(), "00:10:00;00");
    }

    #[test]
    fn non_drop_round_trip() {
        let rate = FrameRate::F25;
        let tc = Timecode::parse("01:02:03:04").unwrap();
        let frames = tc.to_frames(rate).unwrap();
        assert_eq!(frames, (3600 + 120 + 3) * 25 + 4);
        assert_eq!(Timecode::from_frames(frames, rate, false), tc);
    }

    #[test]
    fn malformed_labels() {
        assert!(Timecode::parse("1:02:03:04").is_err());
        assert!(Timecode::parse("00:02:03.04").is_err());
        assert!(Timecode::parse("00:61:03:04").is_err());
    }

    #[test]
    fn seconds_conversion_has_no_drift() {
        let rate = FrameRate::F29_97;
        // One hour of program time, converted frame by frame, never drifts
        // from the rational value.
        let frames = rate.seconds_to_frames(3600.0);
        assert_eq!(frames, 107_892); // 3600 * 30000 / 1001 rounded
        assert!((rate.frames_to_seconds(frames) - 3600.0).abs() < rate.frame_duration());
    }
}
