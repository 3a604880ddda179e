//! SCC document verification.
//!
//! The verifier tokenizes the document on its own, independent of the
//! caption decoder, so a malformed line cannot knock out checking of the
//! lines after it. It never fails, it reports: every problem found becomes
//! a counted issue, with full issue records kept up to a cap.

use crate::scc;
use crate::tables;
use crate::timecode::{FrameRate, Timecode};

/// The category of one verification finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IssueKind {
    Header,
    Timecode,
    Token,
    Parity,
    Order,
    Overlap,
    MixedDelimiter,
}

/// One finding, tied to a 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerificationIssue {
    pub line: usize,
    pub kind: IssueKind,
    pub message: String,
}

/// The verifier's findings over a whole document.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VerificationReport {
    /// True when no check failed.
    pub ok: bool,
    /// Caption lines examined.
    pub lines_checked: usize,
    pub header_errors: usize,
    pub timecode_errors: usize,
    pub token_errors: usize,
    pub parity_errors: usize,
    /// Caption lines whose timecode does not advance past the previous one.
    pub order_errors: usize,
    /// Caption lines starting before the previous line's words finish.
    pub overlap_errors: usize,
    /// Both `:` and `;` frame delimiters appear in the document.
    pub mixed_delimiters: bool,
    /// Issue records were capped; the counters above are still complete.
    pub truncated: bool,
    pub issues: Vec<VerificationIssue>,
}

impl VerificationReport {
    fn push(&mut self, max_errors: usize, line: usize, kind: IssueKind, message: String) {
        let counter = match kind {
            IssueKind::Header => &mut self.header_errors,
            IssueKind::Timecode => &mut self.timecode_errors,
            IssueKind::Token => &mut self.token_errors,
            IssueKind::Parity => &mut self.parity_errors,
            IssueKind::Order => &mut self.order_errors,
            IssueKind::Overlap => &mut self.overlap_errors,
            IssueKind::MixedDelimiter => {
                self.mixed_delimiters = true;
                if self.issues.len() < max_errors {
                    self.issues.push(VerificationIssue { line, kind, message });
                } else {
                    self.truncated = true;
                }
                return;
            }
        };
        *counter += 1;
        if self.issues.len() < max_errors {
            self.issues.push(VerificationIssue { line, kind, message });
        } else {
            self.truncated = true;
        }
    }

    /// One-line human-readable result.
    pub fn summary(&self) -> String {
        if self.ok {
            return format!("OK: {} caption lines, no issues", self.lines_checked);
        }
        format!(
            "{} issue(s) in {} caption lines: {} header, {} timecode, {} token, {} parity, {} order, {} overlap{}",
            self.header_errors
                + self.timecode_errors
                + self.token_errors
                + self.parity_errors
                + self.order_errors
                + self.overlap_errors
                + usize::from(self.mixed_delimiters),
            self.lines_checked,
            self.header_errors,
            self.timecode_errors,
            self.token_errors,
            self.parity_errors,
            self.order_errors,
            self.overlap_errors,
            if self.mixed_delimiters { ", mixed delimiters" } else { "" },
        )
    }
}

/// Check an SCC document. See [`crate::verify_scc`].
pub(crate) fn verify(
    text: &str,
    rate_hint: Option<FrameRate>,
    max_errors: usize,
) -> VerificationReport {
    let rate = rate_hint.unwrap_or(FrameRate::F29_97);
    let mut report = VerificationReport::default();
    let stripped = scc::strip_comments(text);
    let mut lines = stripped
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    match lines.next() {
        Some((_, first)) if first.starts_with(scc::HEADER) => {}
        Some((n, first)) => {
            report.push(
                max_errors,
                n,
                IssueKind::Header,
                format!("expected {:?} first, found {:?}", scc::HEADER, first),
            );
        }
        None => {
            report.push(max_errors, 1, IssueKind::Header, "empty document".into());
        }
    }

    let mut seen_drop = false;
    let mut seen_non_drop = false;
    let mut mixed_reported = false;
    // Previous line's start frame and word count, for order and overlap.
    let mut prev: Option<(u64, usize)> = None;
    for (line_no, line) in lines {
        report.lines_checked += 1;
        let mut tokens = line.split_whitespace();
        let Some(label) = tokens.next() else { continue };

        let mut start = None;
        match Timecode::parse(label) {
            Ok(tc) => {
                if tc.drop_frame {
                    seen_drop = true;
                } else {
                    seen_non_drop = true;
                }
                if seen_drop && seen_non_drop && !mixed_reported {
                    mixed_reported = true;
                    report.push(
                        max_errors,
                        line_no,
                        IssueKind::MixedDelimiter,
                        "document mixes drop-frame and non-drop timecode labels".into(),
                    );
                }
                match tc
                    .assert_legal_drop_frame(rate)
                    .and_then(|()| tc.to_frames(rate))
                {
                    Ok(frame) => start = Some(frame),
                    Err(e) => {
                        report.push(max_errors, line_no, IssueKind::Timecode, e.to_string());
                    }
                }
            }
            Err(e) => {
                report.push(max_errors, line_no, IssueKind::Timecode, e.to_string());
            }
        }

        let mut word_count = 0usize;
        for token in tokens {
            word_count += 1;
            let Some(word) = crate::encoder::EncodedWord::from_hex(token) else {
                report.push(
                    max_errors,
                    line_no,
                    IssueKind::Token,
                    format!("not a 4-digit hex word: {token:?}"),
                );
                continue;
            };
            for byte in [word.hi(), word.lo()] {
                if !tables::check_odd_parity(byte) {
                    report.push(
                        max_errors,
                        line_no,
                        IssueKind::Parity,
                        format!("byte {byte:02X} in word {token} fails odd parity"),
                    );
                }
            }
        }

        if let Some(start) = start {
            if let Some((prev_start, prev_words)) = prev {
                if start <= prev_start {
                    report.push(
                        max_errors,
                        line_no,
                        IssueKind::Order,
                        format!("timecode {label} does not advance past the previous line"),
                    );
                } else if start < prev_start + prev_words as u64 {
                    report.push(
                        max_errors,
                        line_no,
                        IssueKind::Overlap,
                        format!(
                            "line starts at frame {start} but the previous line transmits through frame {}",
                            prev_start + prev_words as u64 - 1
                        ),
                    );
                }
            }
            prev = Some((start, word_count));
        }
    }

    report.ok = report.header_errors == 0
        && report.timecode_errors == 0
        && report.token_errors == 0
        && report.parity_errors == 0
        && report.order_errors == 0
        && report.overlap_errors == 0
        && !report.mixed_delimiters;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::EncodedWord;

    fn doc(lines: &[&str]) -> String {
        let mut s = String::from("Scenarist_SCC V1.0\n\n");
        for l in lines {
            s.push_str(l);
            s.push_str("\n\n");
        }
        s
    }

    #[test]
    fn clean_document_passes() {
        let text = doc(&["00:00:01;00\t9420 94AE 942F", "00:00:02;00\t942C 942C"]);
        let report = verify(&text, None, 100);
        assert!(report.ok, "{}", report.summary());
        assert_eq!(report.lines_checked, 2);
    }

    #[test]
    fn missing_header_flagged() {
        let report = verify("00:00:01;00\t9420\n", None, 100);
        assert!(!report.ok);
        assert_eq!(report.header_errors, 1);
    }

    #[test]
    fn single_flipped_bit_caught() {
        let good = EncodedWord::from_data(0x14, 0x20);
        let bad = EncodedWord::from_raw(good.raw() ^ 0x0001);
        let text = doc(&[&format!("00:00:01;00\t{}", bad.to_hex())]);
        let report = verify(&text, None, 100);
        assert!(!report.ok);
        assert_eq!(report.parity_errors, 1);
        assert_eq!(report.issues[0].kind, IssueKind::Parity);
    }

    #[test]
    fn order_and_overlap() {
        let text = doc(&[
            "00:00:02;00\t9420 94AE 942F 942F",
            "00:00:02;02\t9420", // starts inside the previous 4-word run
            "00:00:02;01\t9420", // goes backwards
        ]);
        let report = verify(&text, None, 100);
        assert_eq!(report.overlap_errors, 1);
        assert_eq!(report.order_errors, 1);
    }

    #[test]
    fn illegal_drop_frame_label() {
        let text = doc(&["00:01:00;00\t9420"]);
        let report = verify(&text, None, 100);
        assert_eq!(report.timecode_errors, 1);
    }

    #[test]
    fn mixed_delimiters_reported_once() {
        let text = doc(&[
            "00:00:01;00\t9420",
            "00:00:02:00\t9420",
            "00:00:03:00\t9420",
        ]);
        let report = verify(&text, None, 100);
        assert!(report.mixed_delimiters);
        let mixed: Vec<_> = report
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::MixedDelimiter)
            .collect();
        assert_eq!(mixed.len(), 1);
    }

    #[test]
    fn error_records_capped_but_counted() {
        let mut lines = Vec::new();
        for i in 0..20 {
            lines.push(format!("00:00:{:02};00\tZZZZ", i + 1));
        }
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let text = doc(&refs);
        let report = verify(&text, None, 5);
        assert_eq!(report.token_errors, 20);
        assert_eq!(report.issues.len(), 5);
        assert!(report.truncated);
    }
}
