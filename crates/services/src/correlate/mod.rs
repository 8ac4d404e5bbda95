use meetscribe_db::models::SpeakerStatus;
use thiserror::Error;

use crate::stage::{SpeakerEvent, SpeakerEventKind};

/// Result of attributing one transcript segment to the speakers active
/// during its interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribution {
    pub status: SpeakerStatus,
    pub speaker_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("speaking interval for '{participant}' ends at {end_ms}ms before it starts at {start_ms}ms")]
    InvalidInterval {
        participant: String,
        start_ms: i64,
        end_ms: i64,
    },
}

/// A closed speaking interval on the session's relative timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakingInterval {
    /// Participant id when the platform provides one, else the display name.
    pub participant_key: String,
    pub participant_name: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Replays the per-speaker SILENT -> SPEAKING -> SILENT state machine over
/// the session's buffered events and returns closed intervals.
///
/// Events are re-sorted by timestamp first; delivery order carries no
/// guarantee. A START while already speaking and an END while silent are
/// ignored. A SPEAKING state still open after the last event extends to
/// `fallback_end_ms` (session end when known, else the latest observed
/// activity for the session).
pub fn speaking_intervals(
    events: &[SpeakerEvent],
    fallback_end_ms: i64,
) -> Result<Vec<SpeakingInterval>, CorrelationError> {
    let mut sorted: Vec<&SpeakerEvent> = events.iter().collect();
    sorted.sort_by_key(|e| (e.relative_timestamp_ms, e.kind == SpeakerEventKind::End));

    let mut open: Vec<(&SpeakerEvent, i64)> = Vec::new();
    let mut intervals = Vec::new();

    for event in sorted {
        let key = participant_key(event);
        match event.kind {
            SpeakerEventKind::Start => {
                if !open.iter().any(|(e, _)| participant_key(e) == key) {
                    open.push((event, event.relative_timestamp_ms));
                }
            }
            SpeakerEventKind::End => {
                if let Some(pos) = open.iter().position(|(e, _)| participant_key(e) == key) {
                    let (start_event, start_ms) = open.swap_remove(pos);
                    if event.relative_timestamp_ms >= start_ms {
                        intervals.push(SpeakingInterval {
                            participant_key: key,
                            participant_name: start_event.participant_name.clone(),
                            start_ms,
                            end_ms: event.relative_timestamp_ms,
                        });
                    }
                }
            }
        }
    }

    // Unterminated SPEAKING states.
    for (event, start_ms) in open {
        if fallback_end_ms < start_ms {
            return Err(CorrelationError::InvalidInterval {
                participant: event.participant_name.clone(),
                start_ms,
                end_ms: fallback_end_ms,
            });
        }
        intervals.push(SpeakingInterval {
            participant_key: participant_key(event),
            participant_name: event.participant_name.clone(),
            start_ms,
            end_ms: fallback_end_ms,
        });
    }

    Ok(intervals)
}

/// Attributes the segment `[start_ms, end_ms)` to the speakers whose
/// intervals intersect it.
pub fn attribute(
    start_ms: i64,
    end_ms: i64,
    intervals: &[SpeakingInterval],
) -> Attribution {
    let mut matched: Vec<&SpeakingInterval> = Vec::new();
    for interval in intervals {
        let overlap_start = interval.start_ms.max(start_ms);
        let overlap_end = interval.end_ms.min(end_ms);
        if overlap_start < overlap_end
            && !matched
                .iter()
                .any(|m| m.participant_key == interval.participant_key)
        {
            matched.push(interval);
        }
    }

    match matched.as_slice() {
        [] => Attribution {
            status: SpeakerStatus::Unknown,
            speaker_name: None,
        },
        [single] => Attribution {
            status: SpeakerStatus::Mapped,
            speaker_name: Some(single.participant_name.clone()),
        },
        // Overlapping speakers: no single name is trustworthy.
        _ => Attribution {
            status: SpeakerStatus::Multiple,
            speaker_name: None,
        },
    }
}

/// Full correlation for one candidate segment. `session_end_rel_ms` wins
/// over `latest_observed_ms` as the open-interval fallback.
pub fn correlate_segment(
    events: &[SpeakerEvent],
    segment_start_ms: i64,
    segment_end_ms: i64,
    session_end_rel_ms: Option<i64>,
    latest_observed_ms: i64,
) -> Result<Attribution, CorrelationError> {
    let fallback_end_ms = session_end_rel_ms.unwrap_or(latest_observed_ms);
    let intervals = speaking_intervals(events, fallback_end_ms)?;
    Ok(attribute(segment_start_ms, segment_end_ms, &intervals))
}

fn participant_key(event: &SpeakerEvent) -> String {
    event
        .participant_id
        .clone()
        .unwrap_or_else(|| event.participant_name.clone())
}
