//! Plain-text extractor: chunked reads with a checkpoint before each chunk.

use crate::{DeadlineGuard, ExtractContext, ExtractError, Extractor};
use core_types::DocFormat;
use std::fs::File;
use std::io::{ErrorKind, Read};

pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn name(&self) -> &'static str {
        "plain-text"
    }

    fn format(&self) -> DocFormat {
        DocFormat::PlainText
    }

    fn extract(
        &self,
        ctx: &ExtractContext<'_>,
        guard: &DeadlineGuard,
    ) -> Result<String, ExtractError> {
        let file = File::open(ctx.path).map_err(ExtractError::open)?;
        read_chunked(file, ctx.options.chunk_size, guard)
    }
}

/// Read `reader` to the end, `chunk_size` bytes at a time. Invalid UTF-8 is
/// replaced with U+FFFD; decoding happens once at the end so multi-byte
/// sequences split across chunks survive.
pub fn read_chunked<R: Read>(
    mut reader: R,
    chunk_size: usize,
    guard: &DeadlineGuard,
) -> Result<String, ExtractError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut bytes = Vec::new();
    loop {
        guard.check_timeout()?;
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ExtractError::decode(err)),
        };
        bytes.extend_from_slice(&buf[..n]);
    }
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Deadline, ManualClock};
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    /// Reader whose every read costs a fixed amount of (manual) time.
    struct SlowReader {
        inner: Cursor<Vec<u8>>,
        clock: Arc<ManualClock>,
        cost: Duration,
        reads: usize,
        max_read: usize,
    }

    impl Read for SlowReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            self.clock.advance(self.cost);
            let len = buf.len().min(self.max_read);
            self.inner.read(&mut buf[..len])
        }
    }

    fn guard(budget: Duration, clock: &Arc<ManualClock>) -> DeadlineGuard {
        Deadline::with_clock(budget, clock.clone()).enter()
    }

    #[test]
    fn concatenates_all_chunks() {
        let clock = Arc::new(ManualClock::new());
        let data = "abcdefghij".repeat(100);
        let text = read_chunked(
            Cursor::new(data.clone().into_bytes()),
            7,
            &guard(Duration::from_secs(1), &clock),
        )
        .unwrap();
        assert_eq!(text, data);
    }

    #[test]
    fn multibyte_sequence_split_across_chunks_is_preserved() {
        let clock = Arc::new(ManualClock::new());
        let data = "héllo wörld ✓";
        let text = read_chunked(
            Cursor::new(data.as_bytes().to_vec()),
            1,
            &guard(Duration::from_secs(1), &clock),
        )
        .unwrap();
        assert_eq!(text, data);
    }

    #[test]
    fn invalid_bytes_are_replaced() {
        let clock = Arc::new(ManualClock::new());
        let text = read_chunked(
            Cursor::new(vec![b'o', b'k', 0xFF, b'!']),
            4096,
            &guard(Duration::from_secs(1), &clock),
        )
        .unwrap();
        assert_eq!(text, "ok\u{FFFD}!");
    }

    #[test]
    fn overrun_is_bounded_by_one_chunk() {
        let clock = Arc::new(ManualClock::new());
        let chunk = 16;
        let cost = Duration::from_millis(10);
        let budget = Duration::from_millis(35);
        let mut reader = SlowReader {
            inner: Cursor::new(vec![b'a'; 10_000]),
            clock: clock.clone(),
            cost,
            reads: 0,
            max_read: chunk,
        };

        let err = read_chunked(&mut reader, chunk, &guard(budget, &clock)).unwrap_err();
        assert!(err.is_timeout());

        // Reads that fit in the budget, plus the one that crossed it.
        let within_budget = (budget.as_millis() / cost.as_millis()) as usize;
        assert!(reader.reads <= within_budget + 1, "read {} chunks", reader.reads);
        assert!(reader.reads >= within_budget);
    }

    #[test]
    fn expired_guard_reads_nothing() {
        let clock = Arc::new(ManualClock::new());
        let guard = guard(Duration::ZERO, &clock);
        clock.advance(Duration::from_nanos(1));
        let mut reader = SlowReader {
            inner: Cursor::new(vec![b'a'; 64]),
            clock: clock.clone(),
            cost: Duration::ZERO,
            reads: 0,
            max_read: 64,
        };
        assert!(read_chunked(&mut reader, 8, &guard).unwrap_err().is_timeout());
        assert_eq!(reader.reads, 0);
    }
}
