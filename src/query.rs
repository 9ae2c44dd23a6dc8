use crate::codec::{self, Record};
use crate::device::DeviceId;
use crate::registry::RecorderRegistry;
use crate::store::{read_lines, StoreError};

/// The newest `count` records of a switch, oldest first.
///
/// A switch without a record file yields an empty list. Lines that do not
/// parse (such as a half-written last line) are left out before the tail is
/// taken.
pub async fn last_records(
    registry: &RecorderRegistry,
    device: DeviceId,
    count: usize,
) -> Result<Vec<Record>, StoreError> {
    let Some(path) = registry.resolve_record_path(device) else {
        return Ok(Vec::new());
    };
    let Some(lines) = read_lines(&path).await? else {
        return Ok(Vec::new());
    };
    Ok(tail_records(device, &lines, count))
}

/// Parses `lines` and keeps the last `count` well-formed records.
pub fn tail_records(device: DeviceId, lines: &[String], count: usize) -> Vec<Record> {
    let mut records: Vec<Record> = lines
        .iter()
        .filter_map(|line| match codec::decode(line) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(device = %device, error = %err, "skipping unreadable record");
                None
            }
        })
        .collect();
    let skip = records.len().saturating_sub(count);
    records.drain(..skip);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn count_at_or_above_total_returns_everything() {
        let input = lines(&["time=1|", "time=2|", "time=3|"]);
        for count in [3, 4, usize::MAX] {
            let records = tail_records(DeviceId::new(1), &input, count);
            let times: Vec<_> = records.iter().map(|r| r["time"].as_str()).collect();
            assert_eq!(times, vec!["1", "2", "3"]);
        }
    }

    #[test]
    fn count_below_total_keeps_newest_in_order() {
        let input = lines(&["time=1|", "time=2|", "time=3|", "time=4|"]);
        let records = tail_records(DeviceId::new(1), &input, 2);
        let times: Vec<_> = records.iter().map(|r| r["time"].as_str()).collect();
        assert_eq!(times, vec!["3", "4"]);
        assert!(tail_records(DeviceId::new(1), &input, 0).is_empty());
    }

    #[test]
    fn truncated_line_is_dropped() {
        let input = lines(&["time=1|rxPackets=10|", "time=2|rxPackets=2"]);
        let records = tail_records(DeviceId::new(1), &input, 10);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["rxPackets"], "10");
    }
}
