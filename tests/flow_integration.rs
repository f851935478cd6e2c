//! End-to-end flow tests: page snapshot in, artifact out, with every HTTP
//! exchange served by a mock endpoint pair.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use igrab::download::{Artifact, DownloadError};
use igrab::flow::{Flow, FlowError};
use igrab::page::{Dom, NodeId, Page, PageLocation};
use igrab::resolve::Session;
use igrab::settings::Settings;

const APP_ID: &str = "936619743392459";

/// A feed page with one post article and a download control inside it.
fn feed_page() -> (Page, NodeId) {
    let mut builder = Dom::builder("html");
    let head = builder.element(builder.root(), "head");
    let script = builder.element(head, "script");
    builder.text(
        script,
        &format!(r#"{{"defaultHeaders":{{"X-IG-App-ID":"{APP_ID}"}}}}"#),
    );
    let body = builder.element(builder.root(), "body");
    let article = builder.element(body, "article");
    let anchor = builder.element(article, "a");
    builder.attr(anchor, "href", "/p/Cflow1/");
    let control = builder.element(article, "div");
    let page = Page::new(
        PageLocation::parse("https://www.instagram.com/").unwrap(),
        builder.build(),
    );
    (page, control)
}

/// A profile page: control sits inside the header next to the picture.
fn profile_page(picture_url: &str) -> (Page, NodeId) {
    let mut builder = Dom::builder("html");
    let body = builder.element(builder.root(), "body");
    let header = builder.element(body, "header");
    let img = builder.element(header, "img");
    builder.attr(img, "src", picture_url);
    let control = builder.element(header, "div");
    let page = Page::new(
        PageLocation::parse("https://www.instagram.com/alice/").unwrap(),
        builder.build(),
    );
    (page, control)
}

fn flow_for(server: &MockServer) -> Flow {
    let session =
        Session::with_base_urls(server.uri(), format!("{}/api/v1/media", server.uri())).unwrap();
    Flow::with_session(session)
}

async fn mount_permalink(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/p/Cflow1/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<script>{"media_id":"31415926535"}</script>"#),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_single_image_flow_produces_named_file() {
    let server = MockServer::start().await;
    mount_permalink(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/media/31415926535/info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "31415926535_777",
                "taken_at": 1_704_067_200,
                "owner": {"username": "alice"},
                "image_versions2": {"candidates": [
                    {"url": format!("{}/media/photo.jpg", server.uri())}
                ]}
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/photo.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"jpeg-bytes"),
        )
        .mount(&server)
        .await;

    let flow = flow_for(&server);
    let (page, control) = feed_page();
    let artifact = flow
        .run(&page, control, &Settings::default())
        .await
        .unwrap();

    match artifact {
        Artifact::File { filename, bytes } => {
            // {username}-{id}-{datetime} with the post's capture time.
            assert_eq!(filename, "alice-31415926535_777-2024-01-01_00-00-00.jpeg");
            assert_eq!(bytes, b"jpeg-bytes");
        }
        _ => panic!("single image must emit a file artifact"),
    }
}

#[tokio::test]
async fn test_batch_flow_archives_successes_and_skips_failures() {
    let server = MockServer::start().await;
    mount_permalink(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/media/31415926535/info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "31415926535_777",
                "taken_at": 1_704_067_200,
                "owner": {"username": "alice"},
                "carousel_media": [
                    {"id": "c1", "image_versions2": {"candidates": [
                        {"url": format!("{}/m/1.png", server.uri())}
                    ]}},
                    {"id": "c2", "image_versions2": {"candidates": [
                        {"url": format!("{}/m/2.png", server.uri())}
                    ]}},
                    {"id": "c3", "image_versions2": {"candidates": [
                        {"url": format!("{}/m/3.png", server.uri())}
                    ]}}
                ]
            }]
        })))
        .mount(&server)
        .await;
    for good in ["/m/1.png", "/m/3.png"] {
        Mock::given(method("GET"))
            .and(path(good))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(b"png-bytes"),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/m/2.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let settings = Settings {
        download_multiple_media: true,
        ..Settings::default()
    };
    let flow = flow_for(&server);
    let (page, control) = feed_page();
    let artifact = flow.run(&page, control, &settings).await.unwrap();

    match artifact {
        Artifact::Archive { filename, bytes } => {
            assert!(filename.starts_with("IG_Media_"));
            assert!(filename.ends_with(".zip"));
            let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
            // The failed middle item is skipped, not fatal.
            assert_eq!(archive.len(), 2);
        }
        _ => panic!("batch mode must emit an archive artifact"),
    }
}

#[tokio::test]
async fn test_batch_flow_with_no_successes_is_an_error() {
    let server = MockServer::start().await;
    mount_permalink(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/media/31415926535/info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "31415926535_777",
                "owner": {"username": "alice"},
                "carousel_media": [
                    {"id": "c1", "image_versions2": {"candidates": [
                        {"url": format!("{}/m/1.png", server.uri())}
                    ]}}
                ]
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/m/1.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let settings = Settings {
        download_multiple_media: true,
        ..Settings::default()
    };
    let flow = flow_for(&server);
    let (page, control) = feed_page();
    let err = flow.run(&page, control, &settings).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Download(DownloadError::EmptyArchive)
    ));
}

#[tokio::test]
async fn test_profile_flow_downloads_header_picture() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pfp/450_n.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "image/jpeg")
                .set_body_bytes(b"profile-bytes"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let flow = flow_for(&server);
    let (page, control) = profile_page(&format!("{}/pfp/450_n.jpg?x=1", server.uri()));
    let artifact = flow
        .run(&page, control, &Settings::default())
        .await
        .unwrap();

    match artifact {
        Artifact::File { filename, bytes } => {
            // No capture time on a profile picture, so the name falls back
            // to the URL basename.
            assert_eq!(filename, "450_n.jpeg");
            assert_eq!(bytes, b"profile-bytes");
        }
        _ => panic!("profile flow must emit a file artifact"),
    }
}

#[tokio::test]
async fn test_single_flow_surfaces_http_failure() {
    let server = MockServer::start().await;
    mount_permalink(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/v1/media/31415926535/info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{
                "id": "31415926535_777",
                "taken_at": 1_704_067_200,
                "owner": {"username": "alice"},
                "image_versions2": {"candidates": [
                    {"url": format!("{}/media/gone.jpg", server.uri())}
                ]}
            }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let flow = flow_for(&server);
    let (page, control) = feed_page();
    let err = flow
        .run(&page, control, &Settings::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FlowError::Download(DownloadError::HttpStatus { status: 404, .. })
    ));
}
