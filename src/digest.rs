use crate::enums::{Algorithm, HttpMethod};
use crate::utils::QuoteForDigest;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};

/// The only qop token the device firmware answers to
pub const SUPPORTED_QOP: &str = "anything";

/// Length of the generated client nonce, in hex characters
const CNONCE_LEN: usize = 8;

//region DigestChallenge

/// Digest challenge parsed from a `WWW-Authenticate` header, bound to the client's nonce counter
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DigestChallenge {
    nonce: String,
    realm: String,
    qop: String,
    algorithm: String,
    nonce_count: u32,
    nc: String,
}

impl DigestChallenge {
    /// Compose a challenge from its parts. A missing algorithm means MD5.
    pub fn new(
        nonce: impl Into<String>,
        realm: impl Into<String>,
        qop: impl Into<String>,
        algorithm: Option<&str>,
        nonce_count: u32,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            realm: realm.into(),
            qop: qop.into(),
            algorithm: algorithm
                .map(str::to_owned)
                .unwrap_or_else(|| Algorithm::default().to_string()),
            nonce_count,
            nc: format!("{:08x}", nonce_count),
        }
    }

    /// Construct from the `WWW-Authenticate` header string.
    /// A leading `Digest` scheme token is skipped.
    ///
    /// # Errors
    /// If the header can't be split into key/value pairs, or `nonce`, `realm` or `qop` is missing
    pub fn parse(input: &str, nonce_count: u32) -> Result<Self> {
        let input = strip_scheme(input.trim());

        let mut kv = parse_header_map(input)?;

        let mut required = |name: &'static str| {
            kv.remove(name)
                .ok_or_else(|| Error::MalformedChallenge(name, input.trim().to_owned()))
        };

        let nonce = required("nonce")?;
        let realm = required("realm")?;
        let qop = required("qop")?;

        Ok(Self::new(
            nonce,
            realm,
            qop,
            kv.get("algorithm").map(String::as_str),
            nonce_count,
        ))
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn qop(&self) -> &str {
        &self.qop
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn nonce_count(&self) -> u32 {
        self.nonce_count
    }

    /// `nonce_count` as 8 zero-padded hex digits
    pub fn nc(&self) -> &str {
        &self.nc
    }

    /// Generate an [`AuthorizationHeader`] answering this challenge
    pub fn respond<'a>(&'a self, context: &'a DigestContext<'a>) -> Result<AuthorizationHeader<'a>> {
        AuthorizationHeader::from_challenge(self, context)
    }
}

/// Parse a challenge header; see [`DigestChallenge::parse`]
pub fn parse_challenge(header_value: &str, nonce_count: u32) -> Result<DigestChallenge> {
    DigestChallenge::parse(header_value, nonce_count)
}

/// Drop a leading `Digest` scheme token; schemes are case-insensitive
fn strip_scheme(input: &str) -> &str {
    const SCHEME: &str = "Digest";

    match input.get(..SCHEME.len()) {
        Some(head) if head.eq_ignore_ascii_case(SCHEME) => {
            let rest = &input[SCHEME.len()..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest
            } else {
                input
            }
        }
        _ => input,
    }
}

/// Helper func that parses the key-value string received from server.
/// Whitespace is allowed on either side of `=`.
pub fn parse_header_map(input: &str) -> Result<HashMap<String, String>> {
    #[derive(Debug)]
    #[allow(non_camel_case_types)]
    enum ParserState {
        P_WHITE,
        P_NAME(usize),
        P_NAME_END,
        P_VALUE_BEGIN,
        P_VALUE_QUOTED,
        P_VALUE_QUOTED_NEXTLITERAL,
        P_VALUE_PLAIN,
    }

    let syntax_error = || Error::InvalidHeaderSyntax(input.trim().to_owned());

    let mut state = ParserState::P_WHITE;

    let mut parsed = HashMap::<String, String>::new();
    let mut current_token: &str = "";
    let mut current_value = String::new();

    for (pos, c) in input.char_indices() {
        match state {
            ParserState::P_WHITE => {
                if c.is_alphabetic() {
                    state = ParserState::P_NAME(pos);
                } else if !(c == ',' || c.is_whitespace()) {
                    return Err(syntax_error());
                }
            }
            ParserState::P_NAME(name_start) => {
                if c == '=' {
                    current_token = &input[name_start..pos];
                    state = ParserState::P_VALUE_BEGIN;
                } else if c.is_whitespace() {
                    current_token = &input[name_start..pos];
                    state = ParserState::P_NAME_END;
                } else if c == ',' {
                    // a bare word without a value
                    return Err(syntax_error());
                }
            }
            ParserState::P_NAME_END => {
                if c == '=' {
                    state = ParserState::P_VALUE_BEGIN;
                } else if !c.is_whitespace() {
                    return Err(syntax_error());
                }
            }
            ParserState::P_VALUE_BEGIN => {
                current_value.clear();
                state = match c {
                    '"' => ParserState::P_VALUE_QUOTED,
                    _ if c.is_whitespace() => ParserState::P_VALUE_BEGIN,
                    ',' => return Err(syntax_error()),
                    _ => {
                        current_value.push(c);
                        ParserState::P_VALUE_PLAIN
                    }
                };
            }
            ParserState::P_VALUE_QUOTED => match c {
                '"' => {
                    parsed.insert(current_token.to_owned(), std::mem::take(&mut current_value));
                    state = ParserState::P_WHITE;
                }
                '\\' => {
                    state = ParserState::P_VALUE_QUOTED_NEXTLITERAL;
                }
                _ => {
                    current_value.push(c);
                }
            },
            ParserState::P_VALUE_PLAIN => {
                if c == ',' || c.is_ascii_whitespace() {
                    parsed.insert(current_token.to_owned(), std::mem::take(&mut current_value));
                    state = ParserState::P_WHITE;
                } else {
                    current_value.push(c);
                }
            }
            ParserState::P_VALUE_QUOTED_NEXTLITERAL => {
                current_value.push(c);
                state = ParserState::P_VALUE_QUOTED
            }
        }
    }

    match state {
        ParserState::P_VALUE_PLAIN => {
            parsed.insert(current_token.to_owned(), current_value);
        }
        ParserState::P_WHITE => {}
        _ => return Err(syntax_error()),
    }

    Ok(parsed)
}

//endregion

//region DigestContext

/// Credentials and request metadata for one digest computation.
///
/// All fields are borrowed; the struct is meaningful only for the one request.
#[derive(Debug)]
pub struct DigestContext<'a> {
    pub username: &'a str,
    pub password: &'a str,
    /// Digest URI exactly as the server expects to see it hashed
    pub uri: &'a str,
    pub method: HttpMethod,
    /// Fixed client nonce (tests only; a fresh one is generated otherwise)
    pub cnonce: Option<&'a str>,
}

impl<'a> DigestContext<'a> {
    pub fn new(username: &'a str, password: &'a str, uri: &'a str, method: HttpMethod) -> Self {
        Self {
            username,
            password,
            uri,
            method,
            cnonce: None,
        }
    }

    pub fn set_custom_cnonce(&mut self, cnonce: &'a str) {
        self.cnonce = Some(cnonce);
    }
}

//endregion

//region AuthorizationHeader

/// Digest answer to a challenge, rendered through `Display` as the `Authorization` value
#[derive(Debug)]
pub struct AuthorizationHeader<'a> {
    pub challenge: &'a DigestChallenge,
    pub username: &'a str,
    pub uri: &'a str,
    pub cnonce: String,
    /// Computed digest
    pub response: String,
}

impl<'a> AuthorizationHeader<'a> {
    /// Validate the challenge options and compute the digest response.
    ///
    /// # Errors
    /// Unsupported algorithm or qop; both are checked before any hashing
    pub fn from_challenge(
        challenge: &'a DigestChallenge,
        context: &'a DigestContext<'a>,
    ) -> Result<Self> {
        let h = Algorithm::from_str(&challenge.algorithm)?;

        if challenge.qop != SUPPORTED_QOP {
            return Err(Error::UnsupportedQop(challenge.qop.clone()));
        }

        let ha1 = h.hash_str(&format!(
            "{name}:{realm}:{pw}",
            name = context.username,
            realm = challenge.realm,
            pw = context.password
        ));
        let ha2 = h.hash_str(&format!(
            "{method}:{uri}",
            method = context.method,
            uri = context.uri
        ));

        let cnonce = match context.cnonce {
            Some(cnonce) => cnonce.to_owned(),
            None => generate_cnonce(),
        };

        let response = h.hash_str(&format!(
            "{ha1}:{nonce}:{nc}:{cnonce}:{qop}:{ha2}",
            nonce = challenge.nonce,
            nc = challenge.nc,
            qop = challenge.qop,
        ));

        Ok(Self {
            challenge,
            username: context.username,
            uri: context.uri,
            cnonce,
            response,
        })
    }
}

impl Display for AuthorizationHeader<'_> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm=\"{}\"",
            self.username.quote_for_digest(),
            self.challenge.realm.quote_for_digest(),
            self.challenge.nonce.quote_for_digest(),
            self.uri.quote_for_digest(),
            self.challenge.algorithm.quote_for_digest(),
        )?;
        write!(
            f,
            ", qop={}, nc={}, cnonce=\"{}\", response=\"{}\"",
            self.challenge.qop,
            self.challenge.nc,
            self.cnonce.quote_for_digest(),
            self.response
        )
    }
}

/// Compute a ready-to-send `Authorization` header value for the given challenge
pub fn compute_digest(
    username: &str,
    password: &str,
    uri: &str,
    method: HttpMethod,
    challenge: &DigestChallenge,
) -> Result<String> {
    let context = DigestContext::new(username, password, uri, method);
    Ok(challenge.respond(&context)?.to_string())
}

/// Timestamp plus random bytes, hashed and cut to a fixed width
fn generate_cnonce() -> String {
    let timestamp = Utc::now().format("%a %b %e %H:%M:%S %Y").to_string();
    let salt: [u8; 16] = rand::thread_rng().gen();

    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(salt);
    let mut cnonce = hex::encode(hasher.finalize());
    cnonce.truncate(CNONCE_LEN);
    cnonce
}

//endregion
