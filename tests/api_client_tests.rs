// Integration tests for the backend and speech provider clients
//
// Each test runs an in-process axum server standing in for the backend and
// checks both what the client sends and how it reads the reply.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::wav_i16;
use oya_speak::api::{
    ApiClient, ApiContext, ApiError, ApiTimeouts, AttemptRequest, Language, PreferencesUpdate, WordFeedback,
};
use oya_speak::audio::{Clip, FallbackClip, RawCapture, WaveformNormalizer};
use oya_speak::practice::{AttemptOrchestrator, PracticeConfig, PracticeItem};
use oya_speak::ProviderClient;
use serde_json::{json, Value};

#[derive(Debug, Clone, Default)]
struct Upload {
    field: String,
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
    language: Option<String>,
}

#[derive(Clone, Default)]
struct MockState {
    uploads: Arc<Mutex<Vec<Upload>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl MockState {
    fn record_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth.lock().unwrap().push(auth);
    }
}

async fn read_upload(mut multipart: Multipart) -> Upload {
    let mut upload = Upload::default();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "language" {
            upload.language = Some(field.text().await.unwrap());
        } else {
            upload.field = name;
            upload.file_name = field.file_name().map(str::to_string);
            upload.content_type = field.content_type().map(str::to_string);
            upload.bytes = field.bytes().await.unwrap().to_vec();
        }
    }
    upload
}

async fn transcribe(State(state): State<MockState>, headers: HeaderMap, multipart: Multipart) -> Json<Value> {
    state.record_auth(&headers);
    let upload = read_upload(multipart).await;
    state.uploads.lock().unwrap().push(upload);
    Json(json!({"transcript": "bawo ni", "request_id": "req-1"}))
}

async fn score(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    state.record_auth(&headers);
    state.bodies.lock().unwrap().push(body);
    Json(json!({
        "score": 75,
        "word_scores": [
            {"word": "bawo", "score": 100, "feedback": "correct"},
            {"word": "ni", "score": 50, "feedback": "partial"}
        ],
        "suggestions": ["Focus on: ni"]
    }))
}

async fn save_attempt(State(state): State<MockState>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    state.record_auth(&headers);
    state.bodies.lock().unwrap().push(body);
    Json(json!({"message": "Attempt saved", "xp": 10, "streak": 3}))
}

async fn list_attempts(State(state): State<MockState>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    state.queries.lock().unwrap().push(query);
    Json(json!([{
        "id": 1, "lesson_item_id": 7, "transcript": "bawo ni", "score": 75.0,
        "word_feedback": [], "created_at": "2025-03-01T10:00:00"
    }]))
}

async fn list_lessons(State(state): State<MockState>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    state.queries.lock().unwrap().push(query);
    Json(json!([{"id": 1, "title": "Greetings", "language": "yoruba", "level": "beginner"}]))
}

async fn lesson_items(Path(id): Path<i64>) -> Json<Value> {
    Json(json!([
        {"id": 7, "lesson_id": id, "text": "Bawo ni"},
        {"id": 8, "lesson_id": id, "text": "E kaaro", "hint": "morning"}
    ]))
}

async fn lesson_item(Path(id): Path<i64>) -> Response {
    if id == 404 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Lesson item not found"}))).into_response();
    }
    Json(json!({"id": id, "lesson_id": 1, "text": "Bawo ni"})).into_response()
}

async fn leaderboard(State(state): State<MockState>, Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    state.queries.lock().unwrap().push(query);
    Json(json!([
        {"id": 4, "name": "Ada", "xp": 120, "streak": 6, "rank": 1},
        {"user_id": 9, "name": "Chidi", "xp": 80}
    ]))
}

async fn get_preferences(State(state): State<MockState>, headers: HeaderMap) -> Json<Value> {
    state.record_auth(&headers);
    Json(json!({
        "id": 1, "user_id": 9, "target_language": "yoruba",
        "created_at": "2025-03-01T10:00:00", "updated_at": "2025-03-01T10:00:00"
    }))
}

async fn put_preferences(State(state): State<MockState>, Query(query): Query<HashMap<String, String>>) -> Response {
    let Some(raw) = query.get("preferences_update") else {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "preferences_update required"}))).into_response();
    };
    let update: Value = serde_json::from_str(raw).unwrap();
    state.bodies.lock().unwrap().push(update.clone());
    Json(json!({
        "id": 1, "user_id": 9, "target_language": update["target_language"],
        "updated_at": "2025-03-02T08:00:00"
    }))
    .into_response()
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn spawn_backend(state: MockState) -> String {
    let app = Router::new()
        .route("/transcribe/", post(transcribe))
        .route("/score/", post(score))
        .route("/attempts/", post(save_attempt).get(list_attempts))
        .route("/lessons/", get(list_lessons))
        .route("/lessons/:id/items", get(lesson_items))
        .route("/lessons/items/:id", get(lesson_item))
        .route("/leaderboard/", get(leaderboard))
        .route("/preference/", get(get_preferences).put(put_preferences))
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .with_state(state);
    serve(app).await
}

/// Backend that answers every request with `status` and `body`
async fn spawn_failing(status: StatusCode, body: &'static str) -> String {
    serve(Router::new().fallback(move || async move { (status, body) })).await
}

fn client(base_url: &str, token: Option<&str>) -> ApiClient {
    let mut context = ApiContext::new(base_url);
    if let Some(token) = token {
        context = context.with_token(token);
    }
    ApiClient::new(context, ApiTimeouts::default()).unwrap()
}

fn normalized_clip() -> Clip {
    let wav = wav_i16(16000, 1, &vec![0i16; 1600]);
    WaveformNormalizer::default().normalize(RawCapture {
        bytes: wav,
        mime_type: "audio/wav".to_string(),
    })
}

#[tokio::test]
async fn test_transcribe_uploads_normalized_wav() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, Some("token-123"));

    let clip = normalized_clip();
    assert!(!clip.is_fallback());

    let response = api.transcribe(&clip, Language::Yoruba).await?;
    assert_eq!(response.transcript, "bawo ni");
    assert_eq!(response.request_id.as_deref(), Some("req-1"));

    let uploads = state.uploads.lock().unwrap();
    let upload = &uploads[0];
    assert_eq!(upload.field, "audio_file");
    assert_eq!(upload.file_name.as_deref(), Some("recording.wav"));
    assert_eq!(upload.content_type.as_deref(), Some("audio/wav"));
    assert_eq!(upload.language.as_deref(), Some("yo"));
    assert_eq!(&upload.bytes[..4], b"RIFF");
    assert_eq!(upload.bytes.len(), 44 + 1600 * 2);
    assert_eq!(state.auth.lock().unwrap()[0].as_deref(), Some("Bearer token-123"));

    Ok(())
}

#[tokio::test]
async fn test_transcribe_fallback_keeps_native_type() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, None);

    let clip = Clip::Fallback(FallbackClip {
        bytes: b"webm bytes".to_vec(),
        mime_type: "audio/webm".to_string(),
    });
    api.transcribe(&clip, Language::Hausa).await?;

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads[0].content_type.as_deref(), Some("audio/webm"));
    assert_eq!(uploads[0].file_name.as_deref(), Some("recording.webm"));
    assert_eq!(uploads[0].bytes, b"webm bytes".to_vec());
    assert_eq!(uploads[0].language.as_deref(), Some("ha"));
    assert_eq!(state.auth.lock().unwrap()[0], None, "No token, no header");

    Ok(())
}

#[tokio::test]
async fn test_score_wire_shape() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, Some("t"));

    let scored = api.score("Bawo ni", "bawo ni", 1.0).await?;

    assert_eq!(scored.score, 75.0);
    assert_eq!(scored.word_scores.len(), 2);
    assert_eq!(scored.word_scores[1].feedback, WordFeedback::Partial);
    assert_eq!(scored.suggestions, vec!["Focus on: ni"]);

    let bodies = state.bodies.lock().unwrap();
    assert_eq!(bodies[0], json!({"target_text": "Bawo ni", "transcript": "bawo ni", "confidence": 1.0}));

    Ok(())
}

#[tokio::test]
async fn test_save_and_list_attempts() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, Some("t"));

    let saved = api
        .save_attempt(&AttemptRequest {
            lesson_item_id: 7,
            transcript: "bawo ni".to_string(),
            score: 75.0,
            word_feedback: Vec::new(),
        })
        .await?;
    assert_eq!(saved.xp, 10);
    assert_eq!(saved.streak, 3);

    let history = api.attempts(0, 20).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].lesson_item_id, 7);
    assert!(history[0].created_at.is_some());

    assert_eq!(state.bodies.lock().unwrap()[0]["lesson_item_id"], 7);
    let queries = state.queries.lock().unwrap();
    assert_eq!(queries[0].get("skip").map(String::as_str), Some("0"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("20"));

    Ok(())
}

#[tokio::test]
async fn test_lessons_and_items() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, None);

    let lessons = api.lessons(Some("yoruba"), Some("beginner")).await?;
    assert_eq!(lessons[0].title, "Greetings");
    {
        let queries = state.queries.lock().unwrap();
        assert_eq!(queries[0].get("language").map(String::as_str), Some("yoruba"));
        assert_eq!(queries[0].get("level").map(String::as_str), Some("beginner"));
    }

    let items = api.lesson_items(1).await?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].hint.as_deref(), Some("morning"));

    let item = api.lesson_item(7).await?;
    assert_eq!(item.text, "Bawo ni");

    assert_eq!(api.health().await?.status, "ok");

    Ok(())
}

#[tokio::test]
async fn test_leaderboard_query() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, Some("t"));

    let top = api.leaderboard(Some("igbo"), 5).await?;
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].name.as_deref(), Some("Ada"));
    assert_eq!(top[0].rank, Some(1));
    assert_eq!(top[1].id, Some(9));
    assert_eq!(top[1].streak, 0);

    api.leaderboard(None, 10).await?;

    let queries = state.queries.lock().unwrap();
    assert_eq!(queries[0].get("language").map(String::as_str), Some("igbo"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("5"));
    assert!(!queries[1].contains_key("language"));
    assert_eq!(queries[1].get("limit").map(String::as_str), Some("10"));

    Ok(())
}

#[tokio::test]
async fn test_read_and_update_preferences() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = client(&base, Some("token-9"));

    let current = api.preferences().await?;
    assert_eq!(current.target_language.as_deref(), Some("yoruba"));
    assert!(current.created_at.is_some());
    assert_eq!(state.auth.lock().unwrap()[0].as_deref(), Some("Bearer token-9"));

    let update = PreferencesUpdate {
        target_language: Some("hausa".to_string()),
        ..PreferencesUpdate::default()
    };
    let updated = api.update_preferences(&update).await?;

    assert_eq!(updated.target_language.as_deref(), Some("hausa"));
    assert!(updated.updated_at.is_some());
    assert_eq!(state.bodies.lock().unwrap()[0], json!({"target_language": "hausa"}));

    Ok(())
}

#[tokio::test]
async fn test_not_found_is_client_error() -> Result<()> {
    let base = spawn_backend(MockState::default()).await;
    let api = client(&base, None);

    let err = api.lesson_item(404).await.unwrap_err();

    match &err {
        ApiError::Client { status, message } => {
            assert_eq!(*status, 404);
            assert_eq!(message, "Lesson item not found");
        }
        other => panic!("expected client error, got {:?}", other),
    }
    assert!(!err.is_retryable(), "4xx must not be retried");

    Ok(())
}

#[tokio::test]
async fn test_server_error_is_retryable() -> Result<()> {
    let base = spawn_failing(StatusCode::INTERNAL_SERVER_ERROR, r#"{"detail": "Transcription failed"}"#).await;
    let api = client(&base, None);

    let err = api.transcribe(&normalized_clip(), Language::English).await.unwrap_err();

    assert!(matches!(&err, ApiError::Server { status: 500, message } if message == "Transcription failed"));
    assert!(err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_is_retryable() -> Result<()> {
    let base = spawn_failing(StatusCode::TOO_MANY_REQUESTS, r#"{"message": "slow down"}"#).await;
    let api = client(&base, None);

    let err = api.score("a", "a", 1.0).await.unwrap_err();

    assert!(matches!(&err, ApiError::RateLimited(message) if message == "slow down"));
    assert!(err.is_retryable());
    assert_eq!(err.status(), Some(429));

    Ok(())
}

#[tokio::test]
async fn test_plain_text_error_body() -> Result<()> {
    let base = spawn_failing(StatusCode::BAD_GATEWAY, "upstream unavailable").await;
    let api = client(&base, None);

    let err = api.health().await.unwrap_err();

    assert!(matches!(&err, ApiError::Server { status: 502, message } if message == "upstream unavailable"));

    Ok(())
}

#[tokio::test]
async fn test_malformed_success_body_is_parse_error() -> Result<()> {
    let base = spawn_failing(StatusCode::OK, "not json").await;
    let api = client(&base, None);

    let err = api.lessons(None, None).await.unwrap_err();

    assert!(matches!(err, ApiError::Parse(_)));
    assert!(!err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() -> Result<()> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let api = client(&format!("http://{}", addr), None);
    let err = api.health().await.unwrap_err();

    assert!(matches!(err, ApiError::Network(_)), "got {:?}", err);
    assert!(err.is_retryable());

    Ok(())
}

#[tokio::test]
async fn test_orchestrator_round_trip_through_backend() -> Result<()> {
    let state = MockState::default();
    let base = spawn_backend(state.clone()).await;
    let api = Arc::new(client(&base, Some("t")));
    let orchestrator = AttemptOrchestrator::with_client(api, PracticeConfig::default());

    let outcome = orchestrator
        .submit(&normalized_clip(), &PracticeItem::new(7, "Bawo ni"), Language::Yoruba)
        .await?;

    assert_eq!(outcome.transcript, "bawo ni");
    assert_eq!(outcome.score, 75.0);
    assert_eq!(outcome.saved.as_ref().map(|s| s.xp), Some(10));

    let bodies = state.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2, "One score request and one attempt");
    assert_eq!(bodies[1]["lesson_item_id"], 7);
    assert_eq!(bodies[1]["transcript"], "bawo ni");
    assert_eq!(bodies[1]["word_feedback"][0]["feedback"], "correct");

    Ok(())
}

async fn provider_transcribe(
    State(state): State<MockState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    multipart: Multipart,
) -> Json<Value> {
    state.record_auth(&headers);
    state.queries.lock().unwrap().push(query);
    let upload = read_upload(multipart).await;
    state.uploads.lock().unwrap().push(upload);
    Json(json!({"transcript": "sannu", "confidence": 0.9}))
}

#[tokio::test]
async fn test_provider_transcription() -> Result<()> {
    let state = MockState::default();
    let app = Router::new()
        .route("/v1/transcribe", post(provider_transcribe))
        .with_state(state.clone());
    let base = serve(app).await;

    let provider = ProviderClient::new(
        format!("{}/v1/transcribe", base),
        "provider-key",
        std::time::Duration::from_secs(10),
    )?;
    let response = provider.transcribe(&normalized_clip(), Language::Hausa).await?;

    assert_eq!(response.transcript, "sannu");
    assert_eq!(response.confidence, Some(0.9));
    assert_eq!(state.queries.lock().unwrap()[0].get("language").map(String::as_str), Some("ha"));
    assert_eq!(state.uploads.lock().unwrap()[0].field, "audio");
    assert_eq!(state.auth.lock().unwrap()[0].as_deref(), Some("Bearer provider-key"));

    Ok(())
}
