//! Integration tests for the signed Last.fm API client

use pmolastfm::api::signing::{Params, api_signature, md5_hex};
use pmolastfm::{ApiCredentials, LastFmApi, LastFmError, PlaylistCursor, RequestMode, Session};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SESSION_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<lfm status="ok">
  <session>
    <name>rj</name>
    <key>d580d57f32848f5dcf574d1ce18d78b2</key>
    <subscriber>0</subscriber>
  </session>
</lfm>"#;

const FAILED_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<lfm status="failed">
  <error code="4">Authentication Failed - You do not have permissions to access the service</error>
</lfm>"#;

fn api(server: &MockServer) -> LastFmApi {
    LastFmApi::builder(ApiCredentials::new("key", "secret"))
        .api_url(format!("{}/2.0/", server.uri()))
        .build()
        .unwrap()
}

fn session() -> Session {
    Session {
        username: "rj".to_string(),
        key: "sk-123".to_string(),
    }
}

fn xml(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/xml")
}

#[tokio::test]
async fn test_authenticate_sends_signed_token() {
    let server = MockServer::start().await;

    let token = md5_hex(&format!("rj{}", md5_hex("hunter2")));
    let mut signed = Params::new();
    signed.insert("api_key".to_string(), "key".to_string());
    signed.insert("authToken".to_string(), token.clone());
    signed.insert("method".to_string(), "auth.getMobileSession".to_string());
    signed.insert("username".to_string(), "rj".to_string());
    let signature = api_signature(&signed, "secret");

    Mock::given(method("GET"))
        .and(path("/2.0/"))
        .and(query_param("method", "auth.getMobileSession"))
        .and(query_param("username", "rj"))
        .and(query_param("authToken", token.as_str()))
        .and(query_param("api_sig", signature.as_str()))
        .respond_with(xml(SESSION_XML))
        .expect(1)
        .mount(&server)
        .await;

    let session = api(&server).authenticate("rj", "hunter2").await.unwrap();

    assert_eq!(session.username, "rj");
    assert_eq!(session.key, "d580d57f32848f5dcf574d1ce18d78b2");
}

#[tokio::test]
async fn test_authenticate_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2.0/"))
        .respond_with(xml(FAILED_XML))
        .mount(&server)
        .await;

    let err = api(&server).authenticate("rj", "wrong").await.unwrap_err();

    match err {
        LastFmError::Auth { code, message } => {
            assert_eq!(code, Some(4));
            assert!(message.starts_with("Authentication Failed"));
        }
        other => panic!("expected an auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_authenticate_without_key_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(xml(r#"<lfm status="ok"><session><name>rj</name></session></lfm>"#))
        .mount(&server)
        .await;

    let err = api(&server).authenticate("rj", "pw").await.unwrap_err();
    assert!(matches!(err, LastFmError::Protocol(_)));
}

#[tokio::test]
async fn test_garbage_body_is_protocol_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad gateway"))
        .mount(&server)
        .await;

    let err = api(&server)
        .call("radio.getPlaylist", RequestMode::Read, Params::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LastFmError::Protocol(_)));
}

#[tokio::test]
async fn test_radio_tune_is_posted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2.0/"))
        .and(body_string_contains("method=radio.tune"))
        .and(body_string_contains("sk=sk-123"))
        .and(body_string_contains("station=lastfm%3A%2F%2Fuser%2Frj%2Fpersonal"))
        .and(body_string_contains("api_sig="))
        .respond_with(xml(
            r#"<lfm status="ok">
                 <station>
                   <type>user</type>
                   <name>Example Radio</name>
                   <url>http://www.last.fm/listen/user/rj/personal</url>
                   <supportsdiscovery>1</supportsdiscovery>
                 </station>
               </lfm>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let info = api(&server)
        .radio_tune(&session(), "lastfm://user/rj/personal")
        .await
        .unwrap();

    assert_eq!(info.name.as_deref(), Some("Example Radio"));
    assert_eq!(info.station_type.as_deref(), Some("user"));
    assert!(info.supports_discovery);
}

#[tokio::test]
async fn test_radio_tune_failure_is_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(xml(
            r#"<lfm status="failed"><error code="12">Subscribers only</error></lfm>"#,
        ))
        .mount(&server)
        .await;

    let err = api(&server)
        .radio_tune(&session(), "lastfm://user/rj/personal")
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        LastFmError::Api { ref method, code: Some(12), .. } if method == "radio.tune"
    ));
}

#[tokio::test]
async fn test_get_playlist_sends_cursor_and_parses_tracks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2.0/"))
        .and(query_param("method", "radio.getPlaylist"))
        .and(query_param("rtp", "1"))
        .and(query_param("discovery", "0"))
        .and(query_param("sk", "sk-123"))
        .respond_with(xml(
            r#"<lfm status="ok">
                 <playlist xmlns="http://xspf.org/ns/0/">
                   <title>+Example+Radio</title>
                   <trackList>
                     <track>
                       <location>http://play.last.fm/user/1.mp3</location>
                       <title>So What</title>
                       <creator>Miles Davis</creator>
                       <duration>540000</duration>
                       <extension application="http://www.last.fm">
                         <trackpage>http://www.last.fm/music/Miles+Davis/_/So+What</trackpage>
                       </extension>
                     </track>
                     <track>
                       <title>No location, skipped</title>
                     </track>
                     <track>
                       <location>http://play.last.fm/user/2.mp3</location>
                       <title>Giant Steps</title>
                       <creator>John Coltrane</creator>
                     </track>
                   </trackList>
                 </playlist>
               </lfm>"#,
        ))
        .mount(&server)
        .await;

    let batch = api(&server)
        .radio_get_playlist(&session(), &PlaylistCursor::new("1", "0"))
        .await
        .unwrap();

    assert_eq!(batch.title.as_deref(), Some("+Example+Radio"));
    assert_eq!(batch.tracks.len(), 2);
    assert_eq!(batch.tracks[0].display_name(), "Miles Davis - So What");
    assert_eq!(batch.tracks[0].duration, Some(540_000));
    assert_eq!(
        batch.tracks[0].track_page.as_deref(),
        Some("http://www.last.fm/music/Miles+Davis/_/So+What")
    );
    assert_eq!(batch.tracks[1].location, "http://play.last.fm/user/2.mp3");
}
