#![forbid(unsafe_code)]

pub mod batch;
pub mod canonical;
pub mod ids;
pub mod resolve;
pub mod sequence;

pub use batch::{Batch, BatchError, BatchFormat, ParsedBatch, PromptSpec, Record, parse_batch};
pub use ids::{EntityId, EntityIdError, EntityKind, PromptOwner};
pub use resolve::{
    BatchResolver, KeyMapping, PromptFile, PromptSource, ResolvedBatch, UnresolvedKeyPolicy,
    UnresolvedRef,
};
pub use sequence::SequenceState;

pub mod clock {
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    const EPOCH_RFC3339: &str = "1970-01-01T00:00:00Z";

    pub fn now_rfc3339() -> String {
        format_rfc3339(OffsetDateTime::now_utc())
    }

    pub fn format_rfc3339(at: OffsetDateTime) -> String {
        at.format(&Rfc3339)
            .unwrap_or_else(|_| EPOCH_RFC3339.to_string())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn formats_utc_with_zulu_suffix() {
            let at = OffsetDateTime::from_unix_timestamp(1_761_515_400).expect("timestamp");
            assert_eq!(format_rfc3339(at), "2025-10-26T21:50:00Z");
            assert!(now_rfc3339().ends_with('Z'));
        }
    }
}
