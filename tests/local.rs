use serde_json::json;
use slide_api::{
    parse_header_map, DigestChallenge, DigestContext, Error, HttpMethod, LocalConfig,
    RequestOptions, SlideClient, LOCAL_ENDPOINTS,
};
use wiremock::matchers::{any, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHALLENGE: &str =
    r#"Digest realm="example.com", nonce="12345", op="testvalue", qop="anything""#;

fn challenge_response(challenge: &str) -> ResponseTemplate {
    ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge)
}

fn local_client(server: &MockServer) -> SlideClient {
    SlideClient::local(LocalConfig::new(server.uri(), "12345")).unwrap()
}

/// Check a digest answer against one recomputed from its own cnonce
fn assert_valid_digest(authorization: &str, uri: &str, method: HttpMethod, nonce_count: u32) {
    let fields = parse_header_map(authorization.strip_prefix("Digest").unwrap()).unwrap();
    assert_eq!(fields["username"], "user");
    assert_eq!(fields["uri"], uri);
    assert_eq!(fields["algorithm"], "MD5");

    let challenge = DigestChallenge::parse(CHALLENGE, nonce_count).unwrap();
    let mut context = DigestContext::new("user", "12345", uri, method);
    context.set_custom_cnonce(&fields["cnonce"]);
    let expected = challenge.respond(&context).unwrap().to_string();

    assert_eq!(authorization, expected);
}

#[tokio::test]
async fn login_without_prior_response_sends_nothing() {
    let server = MockServer::start().await;
    let mut client = local_client(&server);

    assert_eq!(client.login(None).await.unwrap(), "");
    assert_eq!(client.ensure_authenticated().await.unwrap(), "");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_challenge_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let result = client
        .request_digest_access_token(HttpMethod::POST, "/some-url", None, true)
        .await;

    assert!(matches!(result, Err(Error::Unauthorized)));
    assert_eq!(client.session().nonce_count(), 0);
}

#[tokio::test]
async fn digest_access_token_answers_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/some-url"))
        .respond_with(challenge_response(CHALLENGE))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let token = client
        .request_digest_access_token(HttpMethod::POST, "/some-url", None, true)
        .await
        .unwrap();

    let uri = format!("{}/some-url", server.uri());
    assert!(token.starts_with(&format!(
        r#"Digest username="user", realm="example.com", nonce="12345", uri="{}", algorithm="MD5", qop=anything, nc=00000001, cnonce=""#,
        uri
    )));
    assert_valid_digest(&token, &uri, HttpMethod::POST, 1);
    assert_eq!(client.session().nonce_count(), 1);
}

#[tokio::test]
async fn request_performs_digest_handshake() {
    let server = MockServer::start().await;
    Mock::given(path(LOCAL_ENDPOINTS.info))
        .and(header_exists("Authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "pos": 0.5 })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path(LOCAL_ENDPOINTS.info))
        .respond_with(challenge_response(CHALLENGE))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let response = client
        .request(HttpMethod::GET, LOCAL_ENDPOINTS.info, None, RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(response, json!({ "pos": 0.5 }));
    assert_eq!(client.session().nonce_count(), 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].headers.get("Authorization").is_none());
    assert!(requests[1].headers.get("Authorization").is_none());

    let authorization = requests[2].headers["Authorization"].to_str().unwrap();
    let uri = format!("{}{}", server.uri(), LOCAL_ENDPOINTS.info);
    assert_valid_digest(authorization, &uri, HttpMethod::GET, 1);
    assert_eq!(client.session().access_token(), authorization);
}

#[tokio::test]
async fn rejected_digest_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(challenge_response(CHALLENGE))
        .expect(3)
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let result = client
        .request(
            HttpMethod::POST,
            LOCAL_ENDPOINTS.position,
            Some(&json!({ "pos": 0.5 })),
            RequestOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(Error::Unauthorized)));
    assert_eq!(client.session().nonce_count(), 1);
}

#[tokio::test]
async fn unsupported_qop_surfaces() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(challenge_response(
            r#"Digest realm="example.com", nonce="12345", qop="auth""#,
        ))
        .expect(2)
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let result = client
        .request(HttpMethod::POST, LOCAL_ENDPOINTS.stop, None, RequestOptions::default())
        .await;

    assert!(matches!(result, Err(Error::UnsupportedQop(q)) if q == "auth"));
}

#[tokio::test]
async fn malformed_challenge_surfaces() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(challenge_response(r#"Digest realm="example.com", qop="anything""#))
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let result = client
        .request(HttpMethod::POST, LOCAL_ENDPOINTS.calibrate, None, RequestOptions::default())
        .await;

    assert!(matches!(result, Err(Error::MalformedChallenge("nonce", _))));
    // a challenge that fails to parse does not consume a counter value
    assert_eq!(client.session().nonce_count(), 0);
}

#[tokio::test]
async fn skip_login_does_not_handshake() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(challenge_response(CHALLENGE))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = local_client(&server);
    let result = client
        .request(
            HttpMethod::GET,
            LOCAL_ENDPOINTS.info,
            None,
            RequestOptions::default().skip_login(),
        )
        .await;

    assert!(matches!(result, Err(Error::Unauthorized)));
    assert_eq!(client.session().nonce_count(), 0);
}
