//! Orchestrator tests over an in-memory transport.

use super::*;
use crate::config::ClientConfig;
use crate::core::audio::AudioEngine;
use crate::core::auth::TokenSource;
use crate::core::codec::{decode_body, extract_boundary};
use crate::core::connection::{ConnectionManager, ConnectionState};
use crate::core::transport::{
    InboundResponse, OutboundRequest, StreamId, Transport, TransportConnection,
};
use crate::errors::{AvsError, AvsResult};
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

enum Reply {
    NoContent,
    Speak(&'static str, &'static [u8]),
    Reset,
}

#[derive(Default)]
struct Service {
    log: Mutex<Vec<String>>,
    dialog_ids: Mutex<Vec<String>>,
    recognize_replies: Mutex<VecDeque<Reply>>,
}

impl Service {
    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn count(&self, label: &str) -> usize {
        self.log.lock().iter().filter(|entry| *entry == label).count()
    }
}

struct FakeTransport(Arc<Service>);

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self) -> AvsResult<Box<dyn TransportConnection>> {
        self.0.log.lock().push("connect".to_string());
        Ok(Box::new(FakeConnection {
            service: Arc::clone(&self.0),
            next: 1,
            pending: HashMap::new(),
        }))
    }
}

struct FakeConnection {
    service: Arc<Service>,
    next: StreamId,
    pending: HashMap<StreamId, OutboundRequest>,
}

fn speak_response(token: &str, audio: &[u8]) -> InboundResponse {
    let directive = json!({"directive": {
        "header": {"namespace": "SpeechSynthesizer", "name": "Speak", "messageId": "m"},
        "payload": {"url": "cid:speech", "format": "AUDIO_MPEG", "token": token}
    }});
    let mut body = b"--b\r\nContent-Type: application/json\r\n\r\n".to_vec();
    body.extend(directive.to_string().bytes());
    body.extend(b"\r\n--b\r\nContent-Type: application/octet-stream\r\n\r\n");
    body.extend(audio);
    body.extend(b"\r\n--b--\r\n");

    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("multipart/related; boundary=b"),
    );
    InboundResponse::new(StatusCode::OK, headers, Bytes::from(body))
}

fn empty(status: u16) -> InboundResponse {
    InboundResponse::new(
        StatusCode::from_u16(status).unwrap(),
        HeaderMap::new(),
        Bytes::new(),
    )
}

#[async_trait]
impl TransportConnection for FakeConnection {
    async fn request(&mut self, request: OutboundRequest) -> AvsResult<StreamId> {
        let stream = self.next;
        self.next += 1;
        self.pending.insert(stream, request);
        Ok(stream)
    }

    async fn get_response(&mut self, stream: StreamId) -> AvsResult<InboundResponse> {
        let request = self
            .pending
            .remove(&stream)
            .ok_or_else(|| AvsError::Transport(format!("unknown stream {stream}")))?;

        if request.method == Method::GET {
            return Ok(if request.path.ends_with("/directives") {
                empty(200)
            } else {
                empty(204)
            });
        }

        let content_type = request.headers[CONTENT_TYPE].to_str().unwrap();
        let boundary = extract_boundary(content_type).unwrap();
        let message = decode_body(request.body.as_ref().unwrap(), &boundary).unwrap();
        let header = &message.content[0]["event"]["header"];
        let name = header["name"].as_str().unwrap().to_string();
        self.service.log.lock().push(name.clone());

        if name != "Recognize" {
            return Ok(empty(204));
        }
        assert_eq!(message.attachments.len(), 1);
        self.service
            .dialog_ids
            .lock()
            .push(header["dialogRequestId"].as_str().unwrap().to_string());

        let reply = self
            .service
            .recognize_replies
            .lock()
            .pop_front()
            .unwrap_or(Reply::NoContent);
        match reply {
            Reply::NoContent => Ok(empty(204)),
            Reply::Speak(token, audio) => Ok(speak_response(token, audio)),
            Reply::Reset => Err(AvsError::Transport("stream reset".to_string())),
        }
    }

    async fn close(&mut self) {
        self.service.log.lock().push("close".to_string());
    }
}

struct Microphone {
    service: Arc<Service>,
    closed: AtomicBool,
}

#[async_trait]
impl AudioEngine for Microphone {
    async fn capture(&self, _timeout: Option<Duration>) -> AvsResult<Option<Bytes>> {
        Ok(Some(Bytes::from_static(b"PCM")))
    }

    async fn play(&self, audio: Bytes) -> AvsResult<()> {
        self.service
            .log
            .lock()
            .push(format!("play {}", String::from_utf8_lossy(&audio)));
        Ok(())
    }

    async fn close(&self) -> AvsResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn device(service: &Arc<Service>) -> (DeviceOrchestrator, Arc<Microphone>) {
    let microphone = Arc::new(Microphone {
        service: Arc::clone(service),
        closed: AtomicBool::new(false),
    });
    let audio: Arc<dyn AudioEngine> = microphone.clone();
    (device_with(service, audio), microphone)
}

fn device_with(service: &Arc<Service>, audio: Arc<dyn AudioEngine>) -> DeviceOrchestrator {
    let mut config = ClientConfig::new("client-id", "client-secret", "refresh-token");
    config.ping_interval = Duration::from_secs(3600);
    config.keepalive_tick = Duration::from_millis(10);

    let transport: Arc<dyn Transport> = Arc::new(FakeTransport(Arc::clone(service)));
    let tokens: Arc<dyn TokenSource> = Arc::new("token".to_string());
    let connection = Arc::new(ConnectionManager::new(&config, transport, tokens));
    DeviceOrchestrator::new(&config, connection, audio)
}

/// Holds each capture open until released.
struct HeldMicrophone {
    started: Notify,
    release: Notify,
    finished: AtomicBool,
}

#[async_trait]
impl AudioEngine for HeldMicrophone {
    async fn capture(&self, _timeout: Option<Duration>) -> AvsResult<Option<Bytes>> {
        self.started.notify_one();
        self.release.notified().await;
        self.finished.store(true, Ordering::SeqCst);
        Ok(Some(Bytes::from_static(b"PCM")))
    }

    async fn play(&self, _audio: Bytes) -> AvsResult<()> {
        Ok(())
    }

    async fn close(&self) -> AvsResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_turn_plays_speech_between_events() {
    let service = Arc::new(Service::default());
    service
        .recognize_replies
        .lock()
        .push_back(Reply::Speak("weather", b"SUNNY"));
    let (device, _) = device(&service);

    device.start().await.unwrap();
    let summary = device.run_turn().await.unwrap();

    assert_eq!(
        service.log(),
        vec![
            "connect",
            "SynchronizeState",
            "Recognize",
            "SpeechStarted",
            "play SUNNY",
            "SpeechFinished",
        ]
    );
    assert_eq!(summary.directives, 1);
    assert!(service.dialog_ids.lock()[0].starts_with("dialog-"));

    device.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_turn_before_start_is_not_connected() {
    let service = Arc::new(Service::default());
    let (device, _) = device(&service);

    assert!(matches!(
        device.run_turn().await,
        Err(AvsError::NotConnected)
    ));
}

#[tokio::test]
async fn test_run_processes_each_trigger_with_fresh_dialog() {
    let service = Arc::new(Service::default());
    let (device, _) = device(&service);
    device.start().await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    tx.send(()).await.unwrap();
    tx.send(()).await.unwrap();
    drop(tx);
    device.run(rx).await;

    assert_eq!(service.count("Recognize"), 2);
    let ids = service.dialog_ids.lock().clone();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[tokio::test]
async fn test_connection_failure_triggers_one_reconnect() {
    let service = Arc::new(Service::default());
    service.recognize_replies.lock().push_back(Reply::Reset);
    let (device, _) = device(&service);
    device.start().await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    tx.send(()).await.unwrap();
    tx.send(()).await.unwrap();
    drop(tx);
    device.run(rx).await;

    assert_eq!(service.count("connect"), 2);
    assert_eq!(service.count("SynchronizeState"), 2);
    assert_eq!(service.count("Recognize"), 2);
    assert_eq!(device.connection().session_epoch(), Some(2));
}

#[tokio::test]
async fn test_shutdown_closes_connection_then_audio() {
    let service = Arc::new(Service::default());
    let (device, microphone) = device(&service);
    device.start().await.unwrap();

    device.shutdown().await.unwrap();

    assert_eq!(device.connection().state(), ConnectionState::Closed);
    assert!(microphone.closed.load(Ordering::SeqCst));
    assert_eq!(service.log().last().map(String::as_str), Some("close"));

    // The loop exits immediately once shut down
    let (tx, rx) = mpsc::channel(1);
    tx.send(()).await.unwrap();
    device.run(rx).await;
    assert_eq!(service.count("Recognize"), 0);
    assert!(matches!(device.run_turn().await, Err(AvsError::Cancelled)));
}

#[tokio::test]
async fn test_shutdown_during_capture_lets_capture_finish() {
    let service = Arc::new(Service::default());
    let microphone = Arc::new(HeldMicrophone {
        started: Notify::new(),
        release: Notify::new(),
        finished: AtomicBool::new(false),
    });
    let device = device_with(&service, microphone.clone());
    device.start().await.unwrap();
    let shutdown = device.shutdown_token();

    let (result, ()) = tokio::join!(device.run_turn(), async {
        microphone.started.notified().await;
        shutdown.cancel();
        microphone.release.notify_one();
    });

    assert!(matches!(result, Err(AvsError::Cancelled)));
    assert!(microphone.finished.load(Ordering::SeqCst));
    assert_eq!(service.count("Recognize"), 0);
}
