//! Frame-accurate transmission scheduling.
//!
//! Caption data moves at exactly one word per frame, and a decoder only
//! flips the displayed memory on `EOC`. The scheduler places every cue's
//! word sequence on the absolute frame timeline so the `EOC` lands as close
//! to the cue's display time as the channel capacity allows, records how
//! late it lands when it cannot, interleaves erase commands into idle gaps,
//! and keeps all transmissions pairwise non-overlapping.

use crate::block::CaptionBlock;
use crate::encoder::EncodedWord;
use crate::tables::{self, Channel};
use crate::timecode::FrameRate;

/// Event kinds in tie-break order: at the same frame a reset precedes a
/// transmit, which precedes an erase, which precedes the end-of-file erase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventKind {
    StartReset,
    Transmit,
    Erase,
    EndOfFile,
}

/// A run of words anchored at an absolute frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduledEvent {
    pub frame: u64,
    pub kind: EventKind,
    pub words: Vec<EncodedWord>,
}

/// Aggregated late-EOC accounting for one scheduling run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleStats {
    /// Cues whose caption appeared after its requested display time.
    pub late_eoc_count: usize,
    /// Worst lateness in seconds.
    pub max_late_eoc_sec: f64,
    /// Mean lateness in seconds across the late cues.
    pub avg_late_eoc_sec: f64,
    /// Per-cue lateness in seconds; zero for on-time cues.
    pub late_by_cue: Vec<f64>,
}

/// One cue's timing and its mitigation ladder of encodings.
#[derive(Debug, Clone)]
pub(crate) struct CueTiming {
    /// Absolute frame the caption should appear (offset already applied).
    pub display_frame: u64,
    /// Absolute frame the caption should disappear.
    pub end_frame: u64,
    /// Candidate blocks in mitigation order; index 0 is preferred.
    pub variants: Vec<CaptionBlock>,
}

#[derive(Debug, Clone)]
pub(crate) struct ScheduleOptions {
    pub frame_rate: FrameRate,
    pub channel: Channel,
    /// Absolute frame of the program start; the scheduling floor.
    pub offset_frames: u64,
    pub start_reset: bool,
    pub end_of_file_erase: bool,
    pub mitigation_enabled: bool,
    pub max_late_sec: f64,
}

#[derive(Debug)]
struct PlacedCue {
    /// One or two contiguous runs; two after an erase-window split.
    segments: Vec<(u64, Vec<EncodedWord>)>,
    /// Frame the first EOC word transmits, i.e. when the caption appears.
    eoc_frame: u64,
    /// Frame after the last transmitted word.
    transmission_end: u64,
}

impl PlacedCue {
    fn start(&self) -> u64 {
        self.segments[0].0
    }

    fn shift(&mut self, delta: i64) {
        for (start, _) in &mut self.segments {
            *start = start.checked_add_signed(delta).unwrap_or(0);
        }
        self.eoc_frame = self.eoc_frame.checked_add_signed(delta).unwrap_or(0);
        self.transmission_end = self.transmission_end.checked_add_signed(delta).unwrap_or(0);
    }
}

fn pair_word(pair: [u8; 2]) -> EncodedWord {
    EncodedWord::from_data(pair[0], pair[1])
}

/// Place every cue on the timeline and emit the flattened, ordered event
/// list plus lateness statistics.
pub(crate) fn schedule(
    cues: &[CueTiming],
    opts: &ScheduleOptions,
) -> (Vec<ScheduledEvent>, ScheduleStats) {
    let floor = opts.offset_frames;
    let edm = pair_word(tables::erase_displayed(opts.channel));
    let enm = pair_word(tables::erase_non_displayed(opts.channel));

    let mut events = Vec::new();
    let mut prev_end = floor;
    if opts.start_reset {
        // The one event allowed to sit exactly on the program floor.
        events.push(ScheduledEvent {
            frame: floor,
            kind: EventKind::StartReset,
            words: vec![edm, enm],
        });
        prev_end = floor + 2;
    }

    let mut placed: Vec<PlacedCue> = Vec::with_capacity(cues.len());
    for cue in cues {
        let window = cue.display_frame.saturating_sub(prev_end.max(floor));
        let mut block = &cue.variants[0];
        if opts.mitigation_enabled && block.lead_frames() > window {
            let late_sec =
                (block.lead_frames() - window) as f64 * opts.frame_rate.frame_duration();
            if late_sec > opts.max_late_sec {
                block = cue
                    .variants
                    .iter()
                    .find(|b| b.lead_frames() <= window)
                    .or_else(|| cue.variants.iter().min_by_key(|b| b.lead_frames()))
                    .unwrap_or(block);
            }
        }
        let ideal = cue.display_frame.saturating_sub(block.lead_frames()).max(floor);
        let actual = ideal.max(prev_end);
        let eoc_frame = actual + block.lead_frames();
        log::debug!(
            "cue display {} placed at {} (ideal {}), EOC at {}",
            cue.display_frame,
            actual,
            ideal,
            eoc_frame
        );
        if eoc_frame > cue.display_frame {
            log::warn!(
                "caption at frame {} appears {} frame(s) late",
                cue.display_frame,
                eoc_frame - cue.display_frame
            );
        }
        prev_end = actual + block.len() as u64;
        placed.push(PlacedCue {
            segments: vec![(actual, block.words.clone())],
            eoc_frame,
            transmission_end: prev_end,
        });
    }

    // Erase interleaving. Between consecutive cues an EDM pair clears the
    // screen at the first cue's end frame whenever the next caption displays
    // at least two frames later; preloads crossing the two-frame erase
    // window are first nudged earlier, then split around it.
    for i in 0..placed.len() {
        // A caption that ran late must not be erased before it finishes
        // transmitting.
        let end_frame = cues[i].end_frame.max(placed[i].transmission_end);
        let Some(next_timing) = cues.get(i + 1) else {
            if opts.end_of_file_erase {
                events.push(ScheduledEvent {
                    frame: end_frame,
                    kind: EventKind::EndOfFile,
                    words: vec![edm, edm],
                });
            }
            continue;
        };
        // The two-frame erase window must close before the next caption
        // displays, or the EDM pair would clear the new caption instead.
        // With fewer than two idle frames the next EOC replaces this
        // caption directly and no erase is inserted.
        if end_frame + 2 > next_timing.display_frame {
            continue;
        }
        let erase_end = end_frame + 2;
        let (next_start, next_trans_end) = {
            let next = &placed[i + 1];
            (next.start(), next.transmission_end)
        };
        if next_start >= erase_end {
            events.push(ScheduledEvent {
                frame: end_frame,
                kind: EventKind::Erase,
                words: vec![edm, edm],
            });
            continue;
        }
        if next_trans_end > end_frame {
            // Preload overlaps the erase window. Try pulling the whole
            // preload earlier by up to two frames.
            let needed = next_trans_end - end_frame;
            let min_start = placed[i].transmission_end.max(floor);
            let room = next_start - min_start.min(next_start);
            // Never pull the next EOC into or before the erase window.
            let nudged_eoc = placed[i + 1].eoc_frame.saturating_sub(needed);
            if needed <= 2 && room >= needed && nudged_eoc >= erase_end {
                placed[i + 1].shift(-(needed as i64));
            } else {
                // Split the preload around the erase window and push the
                // tail out by the window width.
                let (start, words) = placed[i + 1].segments.remove(0);
                let head_len = end_frame.saturating_sub(start) as usize;
                let head: Vec<_> = words[..head_len.min(words.len())].to_vec();
                let tail: Vec<_> = words[head_len.min(words.len())..].to_vec();
                let mut segments = Vec::new();
                if !head.is_empty() {
                    segments.push((start, head));
                }
                let tail_start = erase_end;
                let lead = placed[i + 1].eoc_frame - start;
                let eoc_frame = if (lead as usize) < head_len {
                    placed[i + 1].eoc_frame
                } else {
                    tail_start + (lead - head_len as u64)
                };
                let transmission_end = tail_start + tail.len() as u64;
                if !tail.is_empty() {
                    segments.push((tail_start, tail));
                }
                placed[i + 1].segments = segments;
                placed[i + 1].eoc_frame = eoc_frame;
                placed[i + 1].transmission_end = transmission_end;
            }
            events.push(ScheduledEvent {
                frame: end_frame,
                kind: EventKind::Erase,
                words: vec![edm, edm],
            });
            // Propagate any delay forward so transmissions never overlap.
            for j in i + 2..placed.len() {
                let prev_end = placed[j - 1].transmission_end;
                if placed[j].start() < prev_end {
                    let delta = (prev_end - placed[j].start()) as i64;
                    placed[j].shift(delta);
                } else {
                    break;
                }
            }
        } else {
            // The preload sits inside [end, end+2) entirely; push it after
            // the window.
            let delta = (erase_end - next_start) as i64;
            placed[i + 1].shift(delta);
            events.push(ScheduledEvent {
                frame: end_frame,
                kind: EventKind::Erase,
                words: vec![edm, edm],
            });
            for j in i + 2..placed.len() {
                let prev_end = placed[j - 1].transmission_end;
                if placed[j].start() < prev_end {
                    let delta = (prev_end - placed[j].start()) as i64;
                    placed[j].shift(delta);
                } else {
                    break;
                }
            }
        }
    }

    // Lateness statistics come from the final placement.
    let mut stats = ScheduleStats::default();
    for (cue, p) in cues.iter().zip(&placed) {
        let late_frames = p.eoc_frame.saturating_sub(cue.display_frame);
        let late_sec = late_frames as f64 * opts.frame_rate.frame_duration();
        stats.late_by_cue.push(late_sec);
        if late_frames > 0 {
            stats.late_eoc_count += 1;
            stats.max_late_eoc_sec = stats.max_late_eoc_sec.max(late_sec);
            stats.avg_late_eoc_sec += late_sec;
        }
    }
    if stats.late_eoc_count > 0 {
        stats.avg_late_eoc_sec /= stats.late_eoc_count as f64;
    }

    for p in placed {
        for (start, words) in p.segments {
            events.push(ScheduledEvent { frame: start, kind: EventKind::Transmit, words });
        }
    }
    events.sort_by_key(|e| (e.frame, e.kind));
    (events, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::CaptionBlock;

    fn opts() -> ScheduleOptions {
        ScheduleOptions {
            frame_rate: FrameRate::F29_97,
            channel: Channel::One,
            offset_frames: 0,
            start_reset: false,
            end_of_file_erase: true,
            mitigation_enabled: false,
            max_late_sec: 0.5,
        }
    }

    fn block(words: usize, eoc_index: usize) -> CaptionBlock {
        CaptionBlock {
            words: vec![EncodedWord::from_data(0x20, 0x20); words],
            eoc_index,
        }
    }

    fn timing(display: u64, end: u64, b: CaptionBlock) -> CueTiming {
        CueTiming { display_frame: display, end_frame: end, variants: vec![b] }
    }

    fn transmit_spans(events: &[ScheduledEvent]) -> Vec<(u64, u64)> {
        events
            .iter()
            .filter(|e| e.kind == EventKind::Transmit)
            .map(|e| (e.frame, e.frame + e.words.len() as u64))
            .collect()
    }

    #[test]
    fn preload_lands_eoc_on_display_frame() {
        let (events, stats) = schedule(&[timing(300, 390, block(12, 10))], &opts());
        let spans = transmit_spans(&events);
        assert_eq!(spans, vec![(290, 302)]);
        assert_eq!(stats.late_eoc_count, 0);
    }

    #[test]
    fn erase_inserted_in_gap() {
        let cues = [
            timing(100, 190, block(10, 8)),
            timing(280, 370, block(10, 8)),
        ];
        let (events, _) = schedule(&cues, &opts());
        let erase: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Erase).collect();
        assert_eq!(erase.len(), 1);
        assert_eq!(erase[0].frame, 190);
        assert_eq!(erase[0].words.len(), 2);
    }

    #[test]
    fn no_erase_when_back_to_back() {
        let cues = [
            timing(100, 190, block(10, 8)),
            timing(190, 280, block(10, 8)),
        ];
        let (events, _) = schedule(&cues, &opts());
        assert!(events.iter().all(|e| e.kind != EventKind::Erase));
    }

    #[test]
    fn one_frame_gap_gets_no_erase() {
        // The next caption displays one frame after the previous end frame.
        // A two-frame erase window cannot fit there; nudging the preload
        // earlier instead would put the EDM pair after the new EOC and wipe
        // the caption it just displayed.
        let cues = [
            timing(50, 100, block(10, 8)),
            timing(101, 160, block(10, 9)),
        ];
        let (events, stats) = schedule(&cues, &opts());
        assert!(events.iter().all(|e| e.kind != EventKind::Erase));
        assert_eq!(transmit_spans(&events), vec![(42, 52), (92, 102)]);
        // The second EOC lands on its display frame; the only EDM pair is
        // the end-of-file erase long after it.
        assert_eq!(stats.late_by_cue[1], 0.0);
        let eof: Vec<_> = events.iter().filter(|e| e.kind == EventKind::EndOfFile).collect();
        assert_eq!(eof.len(), 1);
        assert_eq!(eof[0].frame, 160);
    }

    #[test]
    fn transmissions_never_overlap() {
        let cues = [
            timing(30, 60, block(28, 26)),
            timing(34, 70, block(28, 26)),
            timing(40, 80, block(28, 26)),
            timing(200, 260, block(28, 26)),
        ];
        let (events, stats) = schedule(&cues, &opts());
        let spans = transmit_spans(&events);
        for pair in spans.windows(2) {
            assert!(pair[0].1 <= pair[1].0, "overlap between {pair:?}");
        }
        assert!(stats.late_eoc_count >= 2);
        assert!(stats.max_late_eoc_sec > 0.0);
    }

    #[test]
    fn mitigation_picks_fitting_variant() {
        let mut o = opts();
        o.mitigation_enabled = true;
        o.max_late_sec = 0.1;
        let cues = [
            timing(60, 120, block(60, 58)),
            CueTiming {
                display_frame: 160,
                end_frame: 220,
                variants: vec![block(120, 118), block(20, 18), block(8, 6)],
            },
        ];
        let (events, stats) = schedule(&cues, &o);
        let spans = transmit_spans(&events);
        // The second cue has a 98-frame window after the first cue's
        // transmission ends at frame 62; only the 20-word variant fits.
        assert_eq!(spans[1].1 - spans[1].0, 20);
        assert_eq!(stats.late_by_cue[1], 0.0);
    }

    #[test]
    fn preload_split_around_erase_window(){
        // The second cue's preload must cross the first cue's end frame.
        let cues = [
            timing(40, 100, block(10, 8)),
            timing(110, 160, block(40, 38)),
        ];
        let (events, _) = schedule(&cues, &opts());
        let erase: Vec<_> = events.iter().filter(|e| e.kind == EventKind::Erase).collect();
        assert_eq!(erase.len(), 1);
        assert_eq!(erase[0].frame, 100);
        let spans = transmit_spans(&events);
        // First segment of the split ends at the erase window, the tail
        // resumes two frames later.
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[1].1, 100);
        assert_eq!(spans[2].0, 102);
    }

    #[test]
    fn event_tie_order() {
        assert!(EventKind::StartReset < EventKind::Transmit);
        assert!(EventKind::Transmit < EventKind::Erase);
        assert!(EventKind::Erase < EventKind::EndOfFile);
    }

    #[test]
    fn floor_is_respected() {
        let mut o = opts();
        o.offset_frames = 100;
        o.start_reset = true;
        let (events, _) = schedule(&[timing(104, 200, block(10, 8))], &o);
        assert_eq!(events[0].kind, EventKind::StartReset);
        assert_eq!(events[0].frame, 100);
        for e in &events {
            assert!(e.frame >= 100);
        }
        // Preload cannot start before the reset finishes.
        let spans = transmit_spans(&events);
        assert_eq!(spans[0].0, 102);
    }
}
