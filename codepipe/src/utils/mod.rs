//! Utility functions for id generation and timestamp handling.

mod ids;
pub mod timestamps;

pub use ids::generate_id;
pub use timestamps::{
    checkpoint_stamp, format_iso8601, now_utc, parse_timestamp, Timestamp, TimestampError,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_is_uuid() {
        let id = generate_id();
        assert_eq!(uuid::Uuid::parse_str(&id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_checkpoint_stamp_format() {
        let ts = parse_timestamp("2024-03-09T07:05:01.000042Z").unwrap();
        assert_eq!(checkpoint_stamp(&ts), "20240309_070501_000042");
    }
}
