use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stem_separation_api::config::ServiceConfig;
use stem_separation_api::services::engine::{EngineError, SeparationEngine};
use stem_separation_api::{AppState, create_app};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Writes `{base}_({Label})_htdemucs_6s.wav` for each label, plus any extra
/// names verbatim, into its own output directory.
struct StubEngine {
    output_dir: PathBuf,
    labels: Vec<&'static str>,
    extra: Vec<&'static str>,
    delay: Option<Duration>,
    fail: bool,
}

impl StubEngine {
    fn new(output_dir: PathBuf, labels: &[&'static str], extra: &[&'static str]) -> Self {
        std::fs::create_dir_all(&output_dir).unwrap();
        Self {
            output_dir,
            labels: labels.to_vec(),
            extra: extra.to_vec(),
            delay: None,
            fail: false,
        }
    }
}

#[async_trait]
impl SeparationEngine for StubEngine {
    fn model_tag(&self) -> &str {
        "htdemucs_6s"
    }

    fn output_extension(&self) -> &str {
        "wav"
    }

    async fn separate(&self, input: &Path) -> Result<Vec<PathBuf>, EngineError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(EngineError::Io(std::io::Error::other("model crashed")));
        }

        let content = tokio::fs::read(input).await?;
        let base = input.file_stem().unwrap().to_string_lossy().into_owned();

        let mut outputs = Vec::new();
        for label in &self.labels {
            let path = self
                .output_dir
                .join(format!("{}_({})_htdemucs_6s.wav", base, label));
            let mut stem = format!("{}:", label).into_bytes();
            stem.extend_from_slice(&content);
            tokio::fs::write(&path, stem).await?;
            outputs.push(path);
        }
        for name in &self.extra {
            let path = self.output_dir.join(name);
            tokio::fs::write(&path, b"junk").await?;
            outputs.push(path);
        }
        Ok(outputs)
    }

    async fn health_check(&self) -> bool {
        !self.fail
    }
}

struct TestApp {
    dir: TempDir,
    app: Router,
}

impl TestApp {
    fn engine_dir(&self) -> PathBuf {
        self.dir.path().join("engine_out")
    }

    fn workspace_dir(&self, id: &str) -> PathBuf {
        self.dir.path().join("user_data").join(id)
    }
}

fn setup_with(configure: impl FnOnce(&Path, &mut ServiceConfig) -> StubEngine) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ServiceConfig::local(dir.path());
    let engine = configure(dir.path(), &mut config);
    std::fs::create_dir_all(&config.storage_root).unwrap();
    let state = AppState::new(config, Arc::new(engine));
    TestApp {
        dir,
        app: create_app(state),
    }
}

fn setup(labels: &[&'static str], extra: &[&'static str]) -> TestApp {
    setup_with(|root, _| StubEngine::new(root.join("engine_out"), labels, extra))
}

fn multipart_upload(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/separate/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn separate(app: &Router, filename: &str, content: &[u8]) -> (String, Vec<String>) {
    let response = app
        .clone()
        .oneshot(multipart_upload("file", filename, content))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let user_id = json["user_id"].as_str().unwrap().to_string();
    let files = json["files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f.as_str().unwrap().to_string())
        .collect();
    (user_id, files)
}

#[tokio::test]
async fn test_separation_end_to_end() {
    let test = setup(&["Vocals", "Drums"], &["garbage.wav"]);

    let (user_id, files) = separate(&test.app, "track.wav", b"RIFF....WAVEfmt ").await;

    assert_eq!(
        files,
        vec![
            format!("/static/{}/vocals.wav", user_id),
            format!("/static/{}/drums.wav", user_id),
        ]
    );

    let workspace = test.workspace_dir(&user_id);
    assert_eq!(
        std::fs::read(workspace.join("track.wav")).unwrap(),
        b"RIFF....WAVEfmt "
    );
    assert!(workspace.join("vocals.wav").is_file());
    assert!(workspace.join("drums.wav").is_file());
    assert!(!workspace.join("garbage.wav").exists());

    // The unrecognized artifact is left where the engine wrote it
    assert!(test.engine_dir().join("garbage.wav").is_file());
}

#[tokio::test]
async fn test_stems_round_trip_through_static_and_download() {
    let test = setup(&["Bass", "Other"], &[]);
    let upload: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();

    let (user_id, files) = separate(&test.app, "song.mp3", &upload).await;
    assert_eq!(files.len(), 2);
    assert!(files[1].ends_with("/strings_or_pads.wav"));

    let on_disk = std::fs::read(test.workspace_dir(&user_id).join("bass.wav")).unwrap();

    let response = test.app.clone().oneshot(get(&files[0])).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("inline")
    );
    assert_eq!(body_bytes(response).await, on_disk);

    let response = test
        .app
        .clone()
        .oneshot(get(&format!("/download/{}/bass.wav", user_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .starts_with("attachment; filename=\"bass.wav\"")
    );
    assert_eq!(body_bytes(response).await, on_disk);

    // Original upload: downloadable, but not exposed as a public stem
    let response = test
        .app
        .clone()
        .oneshot(get(&format!("/download/{}/song.mp3", user_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, upload);

    let response = test
        .app
        .clone()
        .oneshot(get(&format!("/static/{}/song.mp3", user_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_file_returns_404_json() {
    let test = setup(&["Vocals"], &[]);
    let (user_id, _) = separate(&test.app, "track.wav", b"RIFF").await;

    for uri in [
        format!("/download/{}/piano.wav", user_id),
        "/download/00000000-0000-4000-8000-000000000000/vocals.wav".to_string(),
        "/download/not-a-workspace/vocals.wav".to_string(),
    ] {
        let response = test.app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body_json(response).await["error"], "File not found");
    }
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let test = setup(&["Vocals"], &[]);
    std::fs::write(test.dir.path().join("secret.txt"), b"top secret").unwrap();
    let (user_id, _) = separate(&test.app, "track.wav", b"RIFF").await;

    let response = test
        .app
        .clone()
        .oneshot(get(&format!(
            "/download/{}/..%2F..%2Fsecret.txt",
            user_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Invalid file path");

    let response = test
        .app
        .clone()
        .oneshot(get("/download/..%2F..%2Fetc/passwd"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = test
        .app
        .clone()
        .oneshot(get(&format!("/download/{}/../../secret.txt", user_id)))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
    assert_ne!(body_bytes(response).await, b"top secret");
}

#[tokio::test]
async fn test_no_matching_outputs_yields_empty_file_list() {
    let test = setup(&[], &["track_(Vocals)_mdx_extra.wav", "garbage.wav"]);

    let (user_id, files) = separate(&test.app, "track.wav", b"RIFF").await;

    assert!(files.is_empty());
    assert!(test.workspace_dir(&user_id).join("track.wav").is_file());
}

#[tokio::test]
async fn test_malformed_uploads_are_rejected() {
    let test = setup(&["Vocals"], &[]);

    // Wrong field name
    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("audio", "track.wav", b"RIFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No file provided");

    // Not audio
    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "payload.exe", b"MZ"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Empty
    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "track.wav", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "Uploaded file is empty");

    // Not multipart at all
    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/separate/")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());

    // Rejected uploads leave no workspaces behind
    let user_data = test.dir.path().join("user_data");
    let leftovers = std::fs::read_dir(&user_data).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_upload_name_is_sanitized() {
    let test = setup(&["Vocals"], &[]);

    let (user_id, files) = separate(&test.app, "../../outside.wav", b"RIFF").await;

    assert_eq!(files, vec![format!("/static/{}/vocals.wav", user_id)]);
    assert!(test.workspace_dir(&user_id).join("outside.wav").is_file());
    assert!(!test.dir.path().join("outside.wav").exists());
}

#[tokio::test]
async fn test_oversized_upload_returns_413() {
    let test = setup_with(|root, config| {
        config.max_upload_size = 16;
        StubEngine::new(root.join("engine_out"), &["Vocals"], &[])
    });

    let big = vec![7u8; 2 * 1024 * 1024];
    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "track.wav", &big))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_upload_limit_applies_to_the_file_itself() {
    let test = setup_with(|root, config| {
        config.max_upload_size = 16;
        StubEngine::new(root.join("engine_out"), &["Vocals"], &[])
    });

    let (_, files) = separate(&test.app, "exact.wav", &[1u8; 16]).await;
    assert_eq!(files.len(), 1);

    // Well inside the multipart framing allowance, but over the file limit
    for size in [17, 500_000] {
        let response = test
            .app
            .clone()
            .oneshot(multipart_upload("file", "track.wav", &vec![1u8; size]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE, "{size}");
    }

    let workspaces = std::fs::read_dir(test.dir.path().join("user_data"))
        .unwrap()
        .count();
    assert_eq!(workspaces, 1);
}

#[tokio::test]
async fn test_upload_named_like_a_stem_is_rejected() {
    let test = setup(&["Vocals"], &[]);

    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "vocals.wav", b"ORIGINAL"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(
        body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("vocals.wav")
    );

    let workspaces = std::fs::read_dir(test.dir.path().join("user_data"))
        .unwrap()
        .count();
    assert_eq!(workspaces, 0);
}

#[tokio::test]
async fn test_client_disconnect_does_not_cancel_separation() {
    let test = setup_with(|root, _| StubEngine {
        delay: Some(Duration::from_millis(300)),
        ..StubEngine::new(root.join("engine_out"), &["Vocals"], &[])
    });

    let request = tokio::spawn(
        test.app
            .clone()
            .oneshot(multipart_upload("file", "track.wav", b"RIFF")),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    request.abort();
    assert!(matches!(request.await, Err(e) if e.is_cancelled()));

    let workspace = std::fs::read_dir(test.dir.path().join("user_data"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let vocals = workspace.join("vocals.wav");

    let mut waited = Duration::ZERO;
    while !vocals.is_file() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(25)).await;
        waited += Duration::from_millis(25);
    }
    assert!(vocals.is_file());
    assert_eq!(std::fs::read(workspace.join("track.wav")).unwrap(), b"RIFF");
}

#[tokio::test]
async fn test_engine_failure_returns_500_json() {
    let test = setup_with(|root, _| StubEngine {
        fail: true,
        ..StubEngine::new(root.join("engine_out"), &[], &[])
    });

    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "track.wav", b"RIFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Audio separation failed");
}

#[tokio::test]
async fn test_engine_timeout_returns_504() {
    let test = setup_with(|root, config| {
        config.engine_timeout = Duration::from_millis(50);
        StubEngine {
            delay: Some(Duration::from_secs(30)),
            ..StubEngine::new(root.join("engine_out"), &["Vocals"], &[])
        }
    });

    let response = test
        .app
        .clone()
        .oneshot(multipart_upload("file", "track.wav", b"RIFF"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_concurrent_jobs_get_distinct_workspaces() {
    let test = setup(&["Vocals", "Drums"], &[]);

    let jobs: Vec<_> = (0..8)
        .map(|i| {
            let app = test.app.clone();
            tokio::spawn(async move {
                let name = format!("take{}.wav", i);
                separate(&app, &name, format!("take {}", i).as_bytes()).await
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for job in jobs {
        let (user_id, files) = job.await.unwrap();
        assert_eq!(files.len(), 2);
        ids.insert(user_id);
    }
    assert_eq!(ids.len(), 8);
}

#[tokio::test]
async fn test_health_and_request_id() {
    let test = setup(&["Vocals"], &[]);

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "trace-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "trace-42");

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["engine"], "ready");
    assert_eq!(json["model"], "htdemucs_6s");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let test = setup(&[], &[]);

    let response = test.app.clone().oneshot(get("/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(body_json(response).await["error"].is_string());
}
