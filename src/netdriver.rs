//! Thin blocking adapter over the transport capability. No buffering, no
//! retries, no timers; timeouts belong to the transport.

use crate::error::Error;
use crate::transport::Transport;

/// Loop over `send` until every byte is delivered.
pub fn send_all(transport: &dyn Transport, mut data: &[u8])
    -> Result<(), Error>
{
    let total = data.len();
    while !data.is_empty() {
        let sent = transport.send(data);
        if sent == 0 || sent > data.len() {
            debug!("transport send failed with {} of {} bytes left",
                   data.len(), total);
            return Err(Error::NetworkError);
        }
        data = &data[sent..];
    }
    trace!("sent {} bytes", total);
    Ok(())
}

/// One receive call. Partial reads are normal and expected.
pub fn recv_some(transport: &dyn Transport, buf: &mut [u8])
    -> Result<usize, Error>
{
    match transport.receive(buf) {
        0 => Err(Error::TimeoutError),
        n if n < 0 => Err(Error::NetworkError),
        n if n as usize > buf.len() => {
            debug!("transport claims {} received into {} byte buffer",
                   n, buf.len());
            Err(Error::NetworkError)
        }
        n => {
            trace!("received {} bytes", n);
            Ok(n as usize)
        }
    }
}

/// Teardown path: the upper layer has already committed, so failures are
/// only worth a warning.
pub fn shutdown(transport: &dyn Transport) {
    if let Err(e) = transport.close() {
        warn!("transport close failed: {}", e);
    }
}
