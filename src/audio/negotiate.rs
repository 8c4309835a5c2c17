//! Sample-rate negotiation against the capture device.

use crate::DetectorError;
use tracing::{debug, info};

/// Opens and immediately closes a mono input stream to test a rate.
pub trait StreamProber {
    fn probe(&self, sample_rate: u32, block_size: usize) -> Result<(), String>;
}

/// Return the first candidate rate the device accepts, in list order.
///
/// Probing stops at the first success; later candidates are never tried.
pub fn negotiate_sample_rate(
    prober: &dyn StreamProber,
    candidates: &[u32],
    block_size: usize,
) -> Result<u32, DetectorError> {
    for &rate in candidates {
        match prober.probe(rate, block_size) {
            Ok(()) => {
                info!(sample_rate = rate, block_size, "negotiated sample rate");
                return Ok(rate);
            }
            Err(reason) => {
                debug!(sample_rate = rate, %reason, "sample rate rejected by device");
            }
        }
    }
    Err(DetectorError::NoSupportedRate {
        candidates: candidates.to_vec(),
    })
}
