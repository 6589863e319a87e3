use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use brainsight::capture::SyntheticCamera;
use brainsight::detect::{BackendResponse, BackendTransport, DetectionClient, RequestFormat};
use brainsight::{
    CaptureError, DetectError, FacingMode, ImageMime, MediaAcquirer, PerceptionError, Phase,
    Session, StreamPreferences,
};

const GOOD_REPLY: &str =
    r#"{"objects":[{"name":"mug","confidence":0.88}],"explanation":"Edges, then a mug."}"#;

struct FixedTransport {
    status: u16,
    body: &'static str,
    calls: Arc<AtomicUsize>,
}

impl BackendTransport for FixedTransport {
    fn post_json(&self, _body: &[u8]) -> Result<BackendResponse, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(BackendResponse {
            status: self.status,
            body: self.body.to_string(),
        })
    }
}

fn prefs() -> StreamPreferences {
    StreamPreferences {
        facing: FacingMode::Environment,
        width: 32,
        height: 24,
    }
}

fn session_with(uri: &str, status: u16, body: &'static str) -> (Session, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let camera = SyntheticCamera::from_uri(uri).expect("stub camera");
    let open_tracks = camera.open_tracks();
    let acquirer = MediaAcquirer::new(Box::new(camera), prefs(), 80);
    let calls = Arc::new(AtomicUsize::new(0));
    let transport = FixedTransport {
        status,
        body,
        calls: calls.clone(),
    };
    let client = DetectionClient::new(Box::new(transport), RequestFormat::Relay, "test-model", 256);
    (Session::new(acquirer, client), open_tracks, calls)
}

#[test]
fn capture_and_detect_from_live_stream() {
    let (mut session, open_tracks, calls) = session_with("stub://desk", 200, GOOD_REPLY);

    let info = session.start_stream().expect("start stream");
    assert_eq!(info.label, "synthetic:desk");
    assert_eq!(session.phase(), Phase::Streaming);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 1);

    let encoding = session.capture_frame().expect("capture");
    assert_eq!(encoding.mime(), ImageMime::Jpeg);
    assert_eq!(&encoding.bytes()[..2], &[0xFF, 0xD8]);

    let result = session.detect(&encoding).expect("detect").clone();
    assert_eq!(result.objects()[0].name(), "mug");
    assert_eq!(session.phase(), Phase::Streaming);
    assert_eq!(session.last_result(), Some(&result));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    session.capture_and_detect().expect("second round");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn starting_twice_opens_one_track() {
    let (mut session, open_tracks, _) = session_with("stub://desk", 200, GOOD_REPLY);
    let first = session.start_stream().unwrap();
    let second = session.start_stream().unwrap();
    assert_eq!(first, second);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_without_stream_is_a_no_op() {
    let (mut session, open_tracks, _) = session_with("stub://desk", 200, GOOD_REPLY);
    session.stop_stream().expect("no-op stop");
    assert_eq!(session.phase(), Phase::Idle);

    session.start_stream().unwrap();
    session.stop_stream().unwrap();
    session.stop_stream().unwrap();
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 0);
    assert!(session.stream_info().is_none());
}

#[test]
fn capture_while_idle_fails_and_keeps_last_result() {
    let (mut session, _, calls) = session_with("stub://desk", 200, GOOD_REPLY);
    let err = session.capture_frame().unwrap_err();
    assert!(matches!(
        err,
        PerceptionError::Capture(CaptureError::NoActiveStream)
    ));
    assert!(session.last_result().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn warmup_frames_report_no_active_stream() {
    let (mut session, _, _) = session_with("stub://desk?warmup=1", 200, GOOD_REPLY);
    session.start_stream().unwrap();
    assert!(matches!(
        session.capture_frame(),
        Err(PerceptionError::Capture(CaptureError::NoActiveStream))
    ));
    assert!(session.capture_frame().is_ok());
}

#[test]
fn denied_camera_leaves_session_idle() {
    let (mut session, open_tracks, _) = session_with("stub://denied", 200, GOOD_REPLY);
    let err = session.start_stream().unwrap_err();
    assert!(matches!(
        err,
        PerceptionError::Capture(CaptureError::MediaAccess { .. })
    ));
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 0);
}

#[test]
fn dropping_session_releases_camera() {
    let (mut session, open_tracks, _) = session_with("stub://desk", 200, GOOD_REPLY);
    session.start_stream().unwrap();
    assert_eq!(open_tracks.load(Ordering::SeqCst), 1);
    drop(session);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 0);
}

#[test]
fn rate_limit_returns_to_streaming_and_keeps_result() {
    let (mut session, _, _) = session_with("stub://desk", 429, r#"{"error":"slow"}"#);
    session.start_stream().unwrap();
    let err = session.capture_and_detect().unwrap_err();
    assert!(matches!(
        err,
        PerceptionError::Detect(DetectError::RateLimited { .. })
    ));
    assert_eq!(session.phase(), Phase::Streaming);
    assert!(session.last_result().is_none());
}

#[test]
fn authentication_failure_halts_and_releases_camera() {
    let (mut session, open_tracks, calls) =
        session_with("stub://desk", 401, r#"{"error":{"message":"bad key"}}"#);
    session.start_stream().unwrap();

    let err = session.capture_and_detect().unwrap_err();
    assert!(matches!(
        err,
        PerceptionError::Detect(DetectError::Authentication { status: 401, .. })
    ));
    assert_eq!(session.phase(), Phase::Error);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 0);

    assert!(matches!(
        session.start_stream(),
        Err(PerceptionError::Halted { .. })
    ));
    let upload = session
        .encode_upload(Cursor::new(vec![1u8, 2, 3]), Some("image/png"), "photo.png")
        .expect("upload encoding does not touch the backend");
    assert!(matches!(
        session.detect(&upload),
        Err(PerceptionError::Halted { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn upload_detection_from_idle_returns_to_idle() {
    let (mut session, open_tracks, _) = session_with("stub://desk", 200, GOOD_REPLY);
    let upload = session
        .encode_upload(Cursor::new(vec![9u8; 16]), None, "blob")
        .expect("encode upload");
    assert_eq!(upload.mime(), ImageMime::Jpeg);

    session.detect(&upload).expect("detect upload");
    assert_eq!(session.phase(), Phase::Idle);
    assert_eq!(open_tracks.load(Ordering::SeqCst), 0);
    assert!(session.last_result().is_some());
}

#[test]
fn observer_sees_every_phase_change() {
    let (mut session, _, _) = session_with("stub://desk", 200, GOOD_REPLY);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.set_observer(move |state| sink.lock().unwrap().push(state.phase()));

    session.start_stream().unwrap();
    session.capture_and_detect().unwrap();
    session.stop_stream().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            Phase::Streaming,
            Phase::Capturing,
            Phase::Streaming,
            Phase::Idle
        ]
    );
}
