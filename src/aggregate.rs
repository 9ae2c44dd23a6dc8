use crate::codec::AggregatedPortSample;
use crate::device::PortCounters;

/// Reduces one port-stats reply to device-level totals.
///
/// The request already asks for every port (`OFPP_NONE`), so every entry is
/// summed. An empty reply gives an all-zero sample stamped with `timestamp_millis`.
/// Sums saturate instead of wrapping.
pub fn aggregate(ports: &[PortCounters], timestamp_millis: i64) -> AggregatedPortSample {
    let mut totals = AggregatedPortSample {
        timestamp_millis,
        ..AggregatedPortSample::default()
    };
    for port in ports {
        totals.rx_packets = totals.rx_packets.saturating_add(port.rx_packets);
        totals.tx_packets = totals.tx_packets.saturating_add(port.tx_packets);
        totals.rx_bytes = totals.rx_bytes.saturating_add(port.rx_bytes);
        totals.tx_bytes = totals.tx_bytes.saturating_add(port.tx_bytes);
        totals.rx_drops = totals.rx_drops.saturating_add(port.rx_dropped);
        totals.tx_drops = totals.tx_drops.saturating_add(port.tx_dropped);
        totals.rx_errors = totals.rx_errors.saturating_add(port.rx_errors);
        totals.tx_errors = totals.tx_errors.saturating_add(port.tx_errors);
        totals.rx_frame_errors = totals.rx_frame_errors.saturating_add(port.rx_frame_errors);
        totals.rx_overrun_errors = totals
            .rx_overrun_errors
            .saturating_add(port.rx_overrun_errors);
        totals.rx_crc_errors = totals.rx_crc_errors.saturating_add(port.rx_crc_errors);
        totals.collisions = totals.collisions.saturating_add(port.collisions);
    }
    totals
}
