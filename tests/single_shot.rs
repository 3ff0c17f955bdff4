use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use mockito::Matcher;
use url::Url;
use uplift::{PresignedPost, UploadClient, UploadError, UploadSource};

fn text_source(contents: &str) -> (tempfile::NamedTempFile, UploadSource) {
    let file = tempfile::Builder::new()
        .prefix("note-")
        .suffix(".txt")
        .tempfile()
        .unwrap();
    std::fs::write(file.path(), contents).unwrap();
    let source = UploadSource::from_path(file.path()).unwrap();
    (file, source)
}

#[tokio::test]
async fn put_reports_binary_progress_on_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/note.txt")
        .match_header("content-type", "text/plain")
        .match_body("hello")
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let (_file, source) = text_source("hello");
    let url = Url::parse(&format!("{}/note.txt", server.url())).unwrap();

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let recorded = recorded.clone();
        move |percent: u8| recorded.lock().unwrap().push(percent)
    };

    let client = UploadClient::new();
    client.put_file(&source, &url, Some(&sink)).await.unwrap();

    assert_eq!(*recorded.lock().unwrap(), vec![0, 100]);
    mock.assert_async().await;
}

#[tokio::test]
async fn put_failure_raises_before_reporting_completion() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("PUT", "/note.txt")
        .with_status(500)
        .create_async()
        .await;

    let (_file, source) = text_source("x");
    let url = Url::parse(&format!("{}/note.txt", server.url())).unwrap();

    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let recorded = recorded.clone();
        move |percent: u8| recorded.lock().unwrap().push(percent)
    };

    let client = UploadClient::new();
    let err = client
        .put_file(&source, &url, Some(&sink))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::PutFailed(_)));
    assert!(err.to_string().contains("PUT upload failed"));
    assert_eq!(*recorded.lock().unwrap(), vec![0]);
}

#[tokio::test]
async fn post_sends_signer_fields_verbatim_with_the_file_last() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="key""#.to_string()),
            Matcher::Regex("uploads/note.txt".to_string()),
            Matcher::Regex(r#"name="policy""#.to_string()),
            Matcher::Regex("policy-data".to_string()),
            Matcher::Regex(r#"name="file""#.to_string()),
            Matcher::Regex("hello".to_string()),
        ]))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let (_file, source) = text_source("hello");
    let post = PresignedPost {
        url: server.url(),
        fields: HashMap::from([
            ("key".to_string(), "uploads/note.txt".to_string()),
            ("policy".to_string(), "policy-data".to_string()),
        ]),
    };

    let client = UploadClient::new();
    client.post_file(&source, &post).await.unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn post_failure_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(403)
        .create_async()
        .await;

    let (_file, source) = text_source("hello");
    let post = PresignedPost {
        url: server.url(),
        fields: HashMap::new(),
    };

    let client = UploadClient::new();
    let err = client.post_file(&source, &post).await.unwrap_err();

    assert!(matches!(err, UploadError::PostFailed(_)));
    assert!(err.to_string().contains("POST upload failed"));
}
