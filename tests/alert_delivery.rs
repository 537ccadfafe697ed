use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Utc;

use safezone_core::{
    AlertDispatcher, CooldownGate, DispatchOutcome, DetectionEvent, EventType, FrameContext,
    FrameDimensions, HttpAlertSink, RetryPolicy, Severity,
};

struct CapturedRequest {
    request_line: String,
    content_type: Option<String>,
    body: String,
}

/// Loopback endpoint answering each connection with the next scripted status.
struct ScriptedEndpoint {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    join: Option<JoinHandle<()>>,
}

impl ScriptedEndpoint {
    fn start(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&requests);

        let join = std::thread::spawn(move || {
            for status in statuses {
                let Ok((stream, _)) = listener.accept() else {
                    return;
                };
                if let Ok(request) = handle(stream, status) {
                    captured.lock().unwrap().push(request);
                }
            }
        });

        Self {
            addr,
            requests,
            join: Some(join),
        }
    }

    fn url(&self) -> String {
        format!("http://{}/api/alerts", self.addr)
    }

    fn finish(mut self) -> Vec<CapturedRequest> {
        if let Some(join) = self.join.take() {
            join.join().expect("endpoint thread");
        }
        std::mem::take(&mut *self.requests.lock().unwrap())
    }
}

fn handle(stream: TcpStream, status: u16) -> std::io::Result<CapturedRequest> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;

    let mut content_length = 0usize;
    let mut content_type = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            }
        }
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let reason = if status == 200 { "OK" } else { "Service Unavailable" };
    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )?;
    stream.flush()?;

    Ok(CapturedRequest {
        request_line: request_line.trim_end().to_string(),
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn fall_event() -> DetectionEvent {
    let ctx = FrameContext {
        frame_number: 17,
        timestamp: Utc::now(),
        dimensions: FrameDimensions::new(640, 480),
        location: "Camera 1",
    };
    DetectionEvent::new(EventType::Fall, Severity::High, &ctx)
        .with_confidence(0.85)
        .with_people(1, vec![])
        .with_description("Person fall detected (aspect ratio: 5.00)")
}

fn dispatcher_for(endpoint: &ScriptedEndpoint, retry_delay: Duration) -> AlertDispatcher {
    let sink = HttpAlertSink::new(endpoint.url(), Duration::from_secs(5)).expect("sink");
    AlertDispatcher::new(
        Arc::new(sink),
        RetryPolicy {
            max_retries: 3,
            retry_delay,
        },
        CooldownGate::new(Duration::from_secs(30)),
    )
}

#[test]
fn retries_until_endpoint_accepts() {
    let endpoint = ScriptedEndpoint::start(vec![503, 503, 200]);
    let dispatcher = dispatcher_for(&endpoint, Duration::from_secs(1));

    let started = Instant::now();
    let outcome = dispatcher.send(&fall_event()).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, DispatchOutcome::Delivered { attempts: 3 });
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_secs(4));
    assert!(dispatcher.gate().last_sent(EventType::Fall).is_some());

    let requests = endpoint.finish();
    assert_eq!(requests.len(), 3);
    for request in &requests {
        assert_eq!(request.request_line, "POST /api/alerts HTTP/1.1");
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
    }

    let body: serde_json::Value = serde_json::from_str(&requests[2].body).unwrap();
    assert_eq!(body["event_type"], "fall");
    assert_eq!(body["frame_number"], 17);
    assert_eq!(body["person_count"], 1);
    assert_eq!(body["location"], "Camera 1");
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[test]
fn persistent_failure_reports_and_keeps_cooldown_open() {
    let endpoint = ScriptedEndpoint::start(vec![503, 503, 503]);
    let dispatcher = dispatcher_for(&endpoint, Duration::from_millis(20));

    let outcome = dispatcher.send(&fall_event()).unwrap();
    match outcome {
        DispatchOutcome::Failed {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("503"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(endpoint.finish().len(), 3);
    assert!(dispatcher.gate().last_sent(EventType::Fall).is_none());
    assert_eq!(dispatcher.dispatched(), 0);
}
