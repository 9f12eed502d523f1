//! Subject catalogue.
//!
//! Subjects are `domain.entity.event`. Handlers subscribe to exact subjects;
//! the prefixes in [`STREAM_SUBJECTS`] exist for stream capture and operator
//! tooling.

pub const SNAPSHOT_CREATED: &str = "media.snapshot.created";
pub const DETECTION_CREATED: &str = "vision.detection.created";
pub const ASSESSMENT_CREATED: &str = "vision.assessment.created";

pub const TASK_GENERATED: &str = "ops.task.generated";
pub const RULE_PROPOSED: &str = "ops.rule.proposed";
pub const RULE_ACTIVATED: &str = "ops.rule.activated";
pub const SNAPSHOT_REQUESTED: &str = "ops.snapshot.requested";

pub const REPORT_REQUESTED: &str = "report.requested";
pub const REPORT_READY: &str = "report.ready";

pub const TELEGRAM_OUTBOUND: &str = "notify.telegram.outbound";

pub const DEVICE_SYNCED: &str = "tb.device.synced";
pub const DEVICE_COMMAND_REQUESTED: &str = "tb.device.command.requested";
pub const DEVICE_COMMAND_COMPLETED: &str = "tb.device.command.completed";

pub const STREAM_NAME: &str = "AFASA";

pub const STREAM_SUBJECTS: &[&str] = &[
    "media.>", "vision.>", "ops.>", "report.>", "notify.>", "tb.>", "dlq.>",
];

pub const DEFAULT_CONSUMER_GROUP: &str = "afasa-workers";

const DEAD_LETTER_PREFIX: &str = "dlq.";

/// Subject that dead letters for `subject` are published on.
pub fn dead_letter_subject(subject: &str) -> String {
    format!("{}{}", DEAD_LETTER_PREFIX, subject)
}

pub fn is_dead_letter_subject(subject: &str) -> bool {
    subject.starts_with(DEAD_LETTER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches_pattern;

    const ALL: &[&str] = &[
        SNAPSHOT_CREATED,
        DETECTION_CREATED,
        ASSESSMENT_CREATED,
        TASK_GENERATED,
        RULE_PROPOSED,
        RULE_ACTIVATED,
        SNAPSHOT_REQUESTED,
        REPORT_REQUESTED,
        REPORT_READY,
        TELEGRAM_OUTBOUND,
        DEVICE_SYNCED,
        DEVICE_COMMAND_REQUESTED,
        DEVICE_COMMAND_COMPLETED,
    ];

    #[test]
    fn test_every_subject_is_captured_by_the_stream() {
        for subject in ALL {
            assert!(
                STREAM_SUBJECTS.iter().any(|p| matches_pattern(subject, p)),
                "{} not covered",
                subject
            );
            let dlq = dead_letter_subject(subject);
            assert!(STREAM_SUBJECTS.iter().any(|p| matches_pattern(&dlq, p)));
        }
    }

    #[test]
    fn test_dead_letter_subject() {
        assert_eq!(dead_letter_subject(REPORT_REQUESTED), "dlq.report.requested");
        assert!(is_dead_letter_subject("dlq.report.requested"));
        assert!(!is_dead_letter_subject(REPORT_REQUESTED));
    }
}
