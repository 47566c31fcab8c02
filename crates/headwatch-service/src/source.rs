//! Line-delimited JSON event source.
//!
//! A platform bridge writes one [`InboundEvent`] per line, for example:
//!
//! ```text
//! {"event":"added","devices":[{"display_name":"Buds","category_code":8}]}
//! {"event":"volume","percent":40}
//! {"event":"removed","devices":[{"display_name":"Buds","category_code":8}]}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use futures::Stream;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::warn;

use headwatch_core::InboundEvent;

/// Parse one line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<InboundEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Stream of events read from `reader`.
///
/// Malformed lines are logged and skipped. The stream ends at end of input
/// or on a read error.
pub fn line_events<R>(reader: R) -> impl Stream<Item = InboundEvent>
where
    R: AsyncBufRead + Unpin,
{
    futures::stream::unfold((reader.lines(), 0u64), |(mut lines, mut line_no)| async move {
        loop {
            let line = next_line(&mut lines).await?;
            line_no += 1;
            match parse_line(&line) {
                Ok(Some(event)) => return Some((event, (lines, line_no))),
                Ok(None) => continue,
                Err(e) => warn!(line = line_no, error = %e, "Skipping malformed event"),
            }
        }
    })
}

async fn next_line<R>(lines: &mut Lines<R>) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    match lines.next_line().await {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "Event source read failed");
            None
        }
    }
}
