// ABOUTME: Integration tests for readiness probes.
// ABOUTME: Socket probes run against real listeners, log probes against scripted streams.

use devstack::runtime::traits::{LogError, LogLine};
use devstack::stack::{ReadinessError, probe_log_stream, probe_socket};
use futures::StreamExt;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

mod support;

const INTERVAL: Duration = Duration::from_millis(100);

/// A port that was free a moment ago.
fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn chunks(parts: &[&str]) -> Vec<Result<LogLine, LogError>> {
    parts.iter().map(|p| Ok(LogLine::stdout(*p))).collect()
}

mod socket_probe {
    use super::*;

    #[tokio::test]
    async fn listener_already_open_is_ready_immediately() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let started = Instant::now();
        probe_socket("127.0.0.1", port, INTERVAL, INTERVAL * 10)
            .await
            .unwrap();
        assert!(started.elapsed() < INTERVAL);
    }

    #[tokio::test]
    async fn succeeds_on_the_first_attempt_after_the_listener_opens() {
        support::init_tracing();
        let port = free_port();
        let opens_after = INTERVAL * 3;

        let server = tokio::spawn(async move {
            tokio::time::sleep(opens_after).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
                .await
                .unwrap();
            // keep accepting until the test is over
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let started = Instant::now();
        probe_socket("127.0.0.1", port, INTERVAL, INTERVAL * 20)
            .await
            .unwrap();
        let elapsed = started.elapsed();
        server.abort();

        assert!(elapsed >= opens_after, "ready before the port opened: {elapsed:?}");
        assert!(
            elapsed < opens_after + INTERVAL * 2,
            "probe lagged behind the listener: {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn never_open_port_times_out_within_one_interval_of_the_deadline() {
        let port = free_port();
        let timeout = INTERVAL * 3;

        let started = Instant::now();
        let err = probe_socket("127.0.0.1", port, INTERVAL, timeout)
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        match &err {
            ReadinessError::SocketTimeout {
                target,
                timeout: reported,
                last_error,
            } => {
                assert_eq!(target, &format!("127.0.0.1:{port}"));
                assert_eq!(*reported, timeout);
                assert!(!last_error.is_empty());
            }
            other => panic!("expected SocketTimeout, got {other:?}"),
        }
        assert_eq!(err.evidence().len(), 1);
        assert!(elapsed < timeout + INTERVAL, "overran the deadline: {elapsed:?}");
    }
}

mod log_probe {
    use super::*;

    #[tokio::test]
    async fn stops_reading_at_the_first_match() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polled);
        let stream = futures::stream::iter(chunks(&[
            "starting up\n",
            "ready to accept connections\n",
            "ready to accept connections\n",
            "shutting down\n",
        ]))
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let pattern = Regex::new("ready to accept").unwrap();
        let matched = probe_log_stream(stream, &pattern, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(matched.line, "ready to accept connections");
        assert_eq!(matched.lines_read, 2);
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn matches_a_line_split_across_chunks() {
        let stream = futures::stream::iter(chunks(&["boot\nread", "y for conn", "ections\nmore\n"]));
        let pattern = Regex::new("^ready for connections$").unwrap();

        let matched = probe_log_stream(stream, &pattern, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(matched.line, "ready for connections");
        assert_eq!(matched.lines_read, 2);
    }

    #[tokio::test]
    async fn trailing_line_without_newline_still_counts() {
        let stream = futures::stream::iter(chunks(&["one\n", "listening on 6379"]));
        let pattern = Regex::new("listening").unwrap();

        let matched = probe_log_stream(stream, &pattern, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(matched.line, "listening on 6379");
    }

    #[tokio::test]
    async fn ended_stream_reports_recent_output() {
        let stream = futures::stream::iter(chunks(&["FATAL: role missing\n", "exiting\n"]));
        let pattern = Regex::new("ready").unwrap();

        let err = probe_log_stream(stream, &pattern, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::StreamEnded { .. }));
        assert_eq!(err.evidence(), ["FATAL: role missing", "exiting"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_stream_times_out_with_bounded_evidence() {
        let lines: Vec<String> = (0..30).map(|i| format!("line {i}\n")).collect();
        let parts: Vec<&str> = lines.iter().map(String::as_str).collect();
        let stream = futures::stream::iter(chunks(&parts)).chain(futures::stream::pending());
        let pattern = Regex::new("ready").unwrap();

        let err = probe_log_stream(stream, &pattern, Duration::from_secs(2))
            .await
            .unwrap_err();
        match &err {
            ReadinessError::LogTimeout { timeout, .. } => {
                assert_eq!(*timeout, Duration::from_secs(2))
            }
            other => panic!("expected LogTimeout, got {other:?}"),
        }
        let evidence = err.evidence();
        assert_eq!(evidence.len(), devstack::stack::EVIDENCE_LINES);
        assert_eq!(evidence.first().map(String::as_str), Some("line 10"));
        assert_eq!(evidence.last().map(String::as_str), Some("line 29"));
    }

    #[tokio::test]
    async fn stream_error_is_an_attach_failure() {
        let stream = futures::stream::iter(vec![Err(LogError::StreamError("gone".to_string()))]);
        let pattern = Regex::new("ready").unwrap();

        let err = probe_log_stream(stream, &pattern, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ReadinessError::Attach(_)));
    }
}
