// ABOUTME: Readiness probing of started containers.
// ABOUTME: TCP connect polling or a regex match over the container's streamed output.

use crate::runtime::{LogChunks, LogError, LogLine, LogOps, LogOptions};
use crate::types::ContainerId;
use futures::{Stream, StreamExt};
use regex::Regex;
use std::collections::VecDeque;
use std::time::{Duration, SystemTime};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::debug;

/// Longest line kept whole; longer runs without a newline are split.
const MAX_LINE_BYTES: usize = 8 * 1024;

/// Lines of output kept as evidence for a failed log probe.
pub const EVIDENCE_LINES: usize = 20;

pub const DEFAULT_PROBE_HOST: &str = "127.0.0.1";
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// TCP connect check against a host port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketProbe {
    pub host: String,
    /// `None` probes the service's resolved primary host port.
    pub port: Option<u16>,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for SocketProbe {
    fn default() -> Self {
        Self {
            host: DEFAULT_PROBE_HOST.to_string(),
            port: None,
            interval: DEFAULT_PROBE_INTERVAL,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }
}

/// Wait for a line of container output matching `pattern`.
#[derive(Debug, Clone)]
pub struct LogPatternProbe {
    pub pattern: Regex,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum ReadinessProbeConfig {
    Socket(SocketProbe),
    LogPattern(LogPatternProbe),
}

impl ReadinessProbeConfig {
    pub fn socket() -> Self {
        ReadinessProbeConfig::Socket(SocketProbe::default())
    }

    pub fn log(pattern: &str) -> Result<Self, regex::Error> {
        Ok(ReadinessProbeConfig::LogPattern(LogPatternProbe {
            pattern: Regex::new(pattern)?,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }))
    }

    pub fn timeout(&self) -> Duration {
        match self {
            ReadinessProbeConfig::Socket(p) => p.timeout,
            ReadinessProbeConfig::LogPattern(p) => p.timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match &mut self {
            ReadinessProbeConfig::Socket(p) => p.timeout = timeout,
            ReadinessProbeConfig::LogPattern(p) => p.timeout = timeout,
        }
        self
    }

    /// Block until the container is ready or the probe gives up.
    ///
    /// A log probe only considers output written at or after `started_at`,
    /// so a restarted container is not judged by its previous run.
    pub async fn await_ready<R: LogOps>(
        &self,
        runtime: &R,
        container: &ContainerId,
        primary_host_port: Option<u16>,
        started_at: Option<SystemTime>,
    ) -> Result<(), ReadinessError> {
        match self {
            ReadinessProbeConfig::Socket(probe) => {
                let port = probe
                    .port
                    .or(primary_host_port)
                    .ok_or(ReadinessError::NoPort)?;
                probe_socket(&probe.host, port, probe.interval, probe.timeout).await
            }
            ReadinessProbeConfig::LogPattern(probe) => {
                let options = match started_at {
                    Some(at) => LogOptions::follow_all().since(at),
                    None => LogOptions::follow_all(),
                };
                let stream: LogChunks = runtime
                    .container_logs(container, &options)
                    .await
                    .map_err(ReadinessError::Attach)?;
                probe_log_stream(stream, &probe.pattern, probe.timeout)
                    .await
                    .map(|_| ())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("{target} not accepting connections after {timeout:?}: {last_error}")]
    SocketTimeout {
        target: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("no output matched /{pattern}/ within {timeout:?}")]
    LogTimeout {
        pattern: String,
        timeout: Duration,
        recent: Vec<String>,
    },

    #[error("output ended before anything matched /{pattern}/")]
    StreamEnded { pattern: String, recent: Vec<String> },

    #[error("could not follow container output: {0}")]
    Attach(#[source] LogError),

    #[error("socket probe has no port to check")]
    NoPort,
}

impl ReadinessError {
    /// Recent log lines, or the last connect error, explaining the failure.
    pub fn evidence(&self) -> &[String] {
        match self {
            ReadinessError::SocketTimeout { last_error, .. } => std::slice::from_ref(last_error),
            ReadinessError::LogTimeout { recent, .. }
            | ReadinessError::StreamEnded { recent, .. } => recent,
            ReadinessError::Attach(_) | ReadinessError::NoPort => &[],
        }
    }
}

/// Connect to `host:port` every `interval` until it succeeds or `timeout` runs out.
///
/// The first attempt is immediate. No attempt is started that could not
/// finish before the deadline.
pub async fn probe_socket(
    host: &str,
    port: u16,
    interval: Duration,
    timeout: Duration,
) -> Result<(), ReadinessError> {
    let target = format!("{host}:{port}");
    let deadline = Instant::now() + timeout;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let started = Instant::now();
        let budget = interval.min(deadline.saturating_duration_since(started));

        let last_error = match tokio::time::timeout(budget, TcpStream::connect(&target)).await {
            Ok(Ok(_)) => {
                debug!(%target, attempt, "socket ready");
                return Ok(());
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("connect timed out after {budget:?}"),
        };
        debug!(%target, attempt, error = %last_error, "socket not ready");

        let next = started + interval;
        if next >= deadline {
            return Err(ReadinessError::SocketTimeout {
                target,
                timeout,
                last_error,
            });
        }
        tokio::time::sleep_until(next).await;
    }
}

/// The line that satisfied a log probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogMatch {
    pub line: String,
    /// Complete lines read, the match included.
    pub lines_read: usize,
}

/// Read `stream` until a line matches `pattern`.
///
/// Chunks are split on newlines with partial lines carried to the next
/// chunk. Reading stops at the first match, so later output stays unread.
pub async fn probe_log_stream<S>(
    mut stream: S,
    pattern: &Regex,
    timeout: Duration,
) -> Result<LogMatch, ReadinessError>
where
    S: Stream<Item = Result<LogLine, LogError>> + Unpin,
{
    let mut recent = RecentLines::new(EVIDENCE_LINES);
    let mut lines_read = 0usize;

    let scan = async {
        let mut buffer = LineBuffer::default();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for line in buffer.push(&chunk.data) {
                lines_read += 1;
                if pattern.is_match(&line) {
                    return Ok(Some(line));
                }
                recent.push(line);
            }
        }
        if let Some(line) = buffer.finish() {
            lines_read += 1;
            if pattern.is_match(&line) {
                return Ok(Some(line));
            }
            recent.push(line);
        }
        Ok::<_, LogError>(None)
    };

    let outcome = tokio::time::timeout(timeout, scan).await;
    match outcome {
        Ok(Ok(Some(line))) => {
            debug!(pattern = %pattern, %line, "log pattern matched");
            Ok(LogMatch { line, lines_read })
        }
        Ok(Ok(None)) => Err(ReadinessError::StreamEnded {
            pattern: pattern.to_string(),
            recent: recent.into_vec(),
        }),
        Ok(Err(e)) => Err(ReadinessError::Attach(e)),
        Err(_) => Err(ReadinessError::LogTimeout {
            pattern: pattern.to_string(),
            timeout,
            recent: recent.into_vec(),
        }),
    }
}

/// Splits chunked output into lines.
///
/// Bytes are held until a line is complete so a character split across
/// chunks decodes intact. Output that never emits a newline is cut into
/// lines of at most `MAX_LINE_BYTES`.
#[derive(Debug, Default)]
struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.partial.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(decode(line));
        }
        if self.partial.len() >= MAX_LINE_BYTES {
            // keep a trailing incomplete character for the next chunk
            let cut = match std::str::from_utf8(&self.partial) {
                Err(e) if e.error_len().is_none() => e.valid_up_to(),
                _ => self.partial.len(),
            };
            let line: Vec<u8> = self.partial.drain(..cut).collect();
            lines.push(decode(line));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        (!self.partial.is_empty()).then(|| decode(std::mem::take(&mut self.partial)))
    }
}

fn decode(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Bounded ring of the most recent lines.
#[derive(Debug)]
struct RecentLines {
    lines: VecDeque<String>,
    capacity: usize,
}

impl RecentLines {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_vec(self) -> Vec<String> {
        self.lines.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use futures::stream;

    fn chunks(parts: &[&str]) -> impl Stream<Item = Result<LogLine, LogError>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(LogLine::stdout(p.to_string())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn line_buffer_carries_partial_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data").is_empty());
        assert_eq!(buffer.push(b"base ready\r\nnext"), vec!["database ready"]);
        assert_eq!(buffer.finish().as_deref(), Some("next"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn character_split_across_chunks_decodes_intact() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"caf\xC3").is_empty());
        assert_eq!(buffer.push(b"\xA9 pr\xC3\xAAt\n"), vec!["café prêt"]);
    }

    #[test]
    fn output_without_newlines_stays_bounded() {
        let mut buffer = LineBuffer::default();
        let chunk = "\r#".repeat(1024);
        let mut emitted = 0;
        for _ in 0..1024 {
            emitted += buffer.push(chunk.as_bytes()).len();
            assert!(buffer.partial.len() < MAX_LINE_BYTES);
        }
        assert!(emitted > 0);
    }

    #[test]
    fn oversized_line_keeps_an_incomplete_character() {
        let mut buffer = LineBuffer::default();
        let mut chunk = vec![b'a'; MAX_LINE_BYTES - 1];
        chunk.push(0xC3);
        let lines = buffer.push(&chunk);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES - 1);
        assert_eq!(buffer.push(b"\xA9\n"), vec!["é"]);
    }

    #[test]
    fn recent_lines_keep_the_tail() {
        let mut ring = RecentLines::new(3);
        for i in 0..5 {
            ring.push(i.to_string());
        }
        assert_eq!(ring.into_vec(), vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn match_split_across_chunks() {
        let pattern = Regex::new("ready to accept").unwrap();
        let found = probe_log_stream(
            chunks(&["booting\nre", "ady to ", "accept connections\n"]),
            &pattern,
            Duration::from_secs(1),
        )
        .await
        .unwrap();
        assert_eq!(found.line, "ready to accept connections");
        assert_eq!(found.lines_read, 2);
    }

    #[tokio::test]
    async fn unterminated_last_line_still_matches() {
        let pattern = Regex::new("started").unwrap();
        let found = probe_log_stream(chunks(&["server started"]), &pattern, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(found.line, "server started");
    }

    #[tokio::test]
    async fn ended_stream_reports_last_twenty_lines() {
        let lines: Vec<String> = (0..30).map(|i| format!("line {i}\n")).collect();
        let parts: Vec<&str> = lines.iter().map(String::as_str).collect();
        let pattern = Regex::new("never").unwrap();
        let err = probe_log_stream(chunks(&parts), &pattern, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::StreamEnded { .. }));
        let evidence = err.evidence();
        assert_eq!(evidence.len(), EVIDENCE_LINES);
        assert_eq!(evidence.first().map(String::as_str), Some("line 10"));
        assert_eq!(evidence.last().map(String::as_str), Some("line 29"));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_with_evidence() {
        let pattern = Regex::new("ready").unwrap();
        let stream = chunks(&["starting\n"]).chain(stream::pending());
        let err = probe_log_stream(stream, &pattern, Duration::from_secs(30))
            .await
            .unwrap_err();
        match err {
            ReadinessError::LogTimeout { recent, timeout, .. } => {
                assert_eq!(recent, vec!["starting"]);
                assert_eq!(timeout, Duration::from_secs(30));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn log_probe_follows_container_output() {
        let runtime = FakeRuntime::new().with_logs("demo-db", &["init", "database system is ready"]);
        let probe = ReadinessProbeConfig::log("system is ready").unwrap();
        probe
            .await_ready(&runtime, &ContainerId::new("id-demo-db"), None, None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn socket_probe_without_any_port_fails() {
        let runtime = FakeRuntime::new();
        let err = ReadinessProbeConfig::socket()
            .await_ready(&runtime, &ContainerId::new("id-x"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::NoPort));
    }
}
