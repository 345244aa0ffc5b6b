#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;

    use axum::extract::{Form, Multipart};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use peekaboo_client::client::client::{HttpStegoClient, StegoService, TransportError};
    use peekaboo_client::client::presenter::{PasswordPurpose, Presenter, Warning};
    use peekaboo_client::client::SessionMiddleware;
    use peekaboo_client::common::config::{ServiceConfig, SessionConfig};
    use peekaboo_client::common::messages::{ExtractStatus, FileCategory};
    use peekaboo_client::session::state::{CarrierImage, Completion, EmbedBatch, ExtractOutcome};
    use peekaboo_client::session::CandidateFile;

    /// Answers like the deployed service: string-valued JSON maps.
    async fn upload(mut multipart: Multipart) -> Result<Json<Value>, StatusCode> {
        let mut size = None;
        while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
            if field.name() == Some("file") && field.file_name() == Some("cat.png") {
                let bytes = field.bytes().await.map_err(|_| StatusCode::BAD_REQUEST)?;
                size = Some(bytes.len());
            }
        }
        let size = size.ok_or(StatusCode::BAD_REQUEST)?;

        Ok(Json(json!({
            "coded": "True",
            "password": "True",
            "capacity": (size * 100).to_string(),
            "overhead": "10",
        })))
    }

    /// Echoes the received file names in `thumbnail` and the password in `filename`.
    async fn embed(mut multipart: Multipart) -> Result<Json<Value>, StatusCode> {
        let mut names = Vec::new();
        let mut password = None;
        while let Some(field) = multipart.next_field().await.map_err(|_| StatusCode::BAD_REQUEST)? {
            let name = field.name().map(str::to_string);
            match name.as_deref() {
                Some("files") => names.push(field.file_name().unwrap_or_default().to_string()),
                Some("password") => {
                    password = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?)
                }
                _ => {}
            }
        }

        if password.as_deref() == Some("explode") {
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }

        Ok(Json(json!({
            "embedded": "True",
            "time": "0.042 sec",
            "thumbnail": names.join("+"),
            "filename": password.unwrap_or_default(),
        })))
    }

    async fn extract(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
        match form.get("password").map(String::as_str) {
            Some("open sesame") => {
                let files = json!([
                    {"name": "inner.png", "path": "secrets/inner.png", "type": "image/png", "coded": "true"},
                    {"name": "notes.txt", "path": "secrets/notes.txt", "type": "text/plain", "coded": "false"},
                ]);
                Json(json!({
                    "extracted": "True",
                    "time": "0.500 sec",
                    "files": files.to_string(),
                }))
            }
            Some("garbage") => Json(json!({ "unexpected": true })),
            _ => Json(json!({
                "extracted": "Incorrect password provided",
                "time": "0.001 sec",
            })),
        }
    }

    async fn spawn_service() -> String {
        let app = Router::new()
            .route("/upload", post(upload))
            .route("/embed", post(embed))
            .route("/extract", post(extract));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    async fn client() -> HttpStegoClient {
        HttpStegoClient::new(&ServiceConfig {
            base_url: spawn_service().await,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_upload_parses_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cat.png", b"0123456789");
        let image = CarrierImage::from_path(&path).await.unwrap();
        assert_eq!(image.mime_type, "image/png");

        let analysis = client().await.upload(&image).await.unwrap();
        assert!(analysis.coded_already);
        assert!(analysis.password_protected);
        assert_eq!(analysis.capacity_bytes, 1000);
        assert_eq!(analysis.overhead_per_file_bytes, 10);
    }

    #[tokio::test]
    async fn test_embed_sends_files_and_password() {
        let dir = tempfile::tempdir().unwrap();
        let a = CandidateFile::from_path(write(dir.path(), "a.txt", b"alpha")).await.unwrap();
        let b = CandidateFile::from_path(write(dir.path(), "b.bin", b"beta")).await.unwrap();
        assert_eq!(a.size_bytes, 5);

        let batch = EmbedBatch {
            files: vec![a, b],
            password: Some("hunter2".to_string()),
        };
        let response = client().await.embed(&batch).await.unwrap();

        assert_eq!(response.embedded_count, 2);
        assert_eq!(response.artifact.as_deref(), Some("a.txt+b.bin"));
        assert_eq!(response.filename.as_deref(), Some("hunter2"));
        assert_eq!(response.elapsed, Some(std::time::Duration::from_millis(42)));
    }

    #[tokio::test]
    async fn test_embed_server_error_is_status() {
        let dir = tempfile::tempdir().unwrap();
        let file = CandidateFile::from_path(write(dir.path(), "a.txt", b"alpha")).await.unwrap();
        let batch = EmbedBatch {
            files: vec![file],
            password: Some("explode".to_string()),
        };

        match client().await.embed(&batch).await {
            Err(TransportError::Status { status, .. }) => assert_eq!(status, 500),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_outcomes() {
        let client = client().await;

        let response = client.extract(Some("open sesame")).await.unwrap();
        assert_eq!(response.status, ExtractStatus::Succeeded);
        assert_eq!(response.files.len(), 2);
        assert!(response.files[0].is_coded_carrier());
        assert_eq!(response.files[1].category(), FileCategory::Text);

        let response = client.extract(Some("nope")).await.unwrap();
        assert_eq!(response.status, ExtractStatus::WrongPassword);
        assert!(response.files.is_empty());

        assert!(matches!(
            client.extract(Some("garbage")).await,
            Err(TransportError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let client = HttpStegoClient::new(&ServiceConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            request_timeout_secs: 2,
        })
        .unwrap();

        assert!(matches!(
            client.extract(None).await,
            Err(TransportError::Request(_))
        ));
    }

    struct Scripted {
        answers: std::cell::RefCell<Vec<String>>,
    }

    impl Presenter for Scripted {
        fn busy(&self, _visible: bool) {}

        fn warn(&self, _warning: &Warning) {}

        async fn prompt_password(&self, _purpose: PasswordPurpose) -> Option<String> {
            self.answers.borrow_mut().pop()
        }
    }

    #[tokio::test]
    async fn test_end_to_end_extract_after_wrong_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "cat.png", b"0123456789");

        // answers are popped from the back
        let presenter = Scripted {
            answers: std::cell::RefCell::new(vec!["open sesame".to_string(), "wrong".to_string()]),
        };
        let middleware = SessionMiddleware::new(SessionConfig::default(), client().await, presenter);

        middleware
            .select_image(CarrierImage::from_path(&path).await.unwrap())
            .unwrap();
        let _ = middleware.upload().await.unwrap();
        assert_eq!(
            middleware.session().borrow().carrier().unwrap().ledger().remaining(),
            990
        );

        match middleware.extract().await.unwrap() {
            Completion::Applied(ExtractOutcome::Extracted(response)) => {
                assert_eq!(response.files[0].name, "inner.png")
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(
            middleware.session().borrow().carrier().unwrap().retry_policy().attempts(),
            0
        );
    }
}
