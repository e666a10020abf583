use std::io::BufRead;

use crate::envelope::Envelope;
use crate::error::TransportError;

/// Decodes one envelope per line, handing each to `callback` in order.
/// Blank lines are skipped. Returns how many envelopes were delivered.
pub fn read_envelopes<R, F>(reader: R, mut callback: F) -> Result<usize, TransportError>
where
    R: BufRead,
    F: FnMut(Envelope),
{
    let mut delivered = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let envelope = Envelope::decode(trimmed).map_err(|source| TransportError::Decode {
            line: idx + 1,
            source,
        })?;
        callback(envelope);
        delivered += 1;
    }
    Ok(delivered)
}
