use std::io;

use anyhow::anyhow;
use hmac::{Hmac, Mac};
use rocket::{
    data::{ByteUnit, FromData, Outcome},
    http::Status,
    Data, Request,
};
use sha2::Sha256;
use tracing::trace;

use crate::webhooks::github::GitHubSecret;

const X_GITHUB_SIGNATURE: &str = "X-Hub-Signature-256";

type HmacSha256 = Hmac<Sha256>;

/// Checks a `X-Hub-Signature-256` header value (`sha256=<hex digest>`) against the HMAC-SHA256 of
/// `body` keyed with `secret`.
///
/// Anything malformed is simply a failed verification. The digest comparison runs in constant
/// time.
pub fn verify(body: &[u8], header: &str, secret: &[u8]) -> bool {
    trace!("validating signature...");

    let (algorithm, signature) = match header.split_once('=') {
        Some(parts) => parts,
        None => {
            trace!("malformed signature header `{}`", header);
            return false;
        }
    };

    if algorithm != "sha256" {
        trace!("unsupported signature algorithm `{}`", algorithm);
        return false;
    }

    // GitHub sends lowercase hex, anything else isn't a digest we produced
    if !signature
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        trace!("signature `{}` isn't lowercase hex", signature);
        return false;
    }

    let signature = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            trace!("couldn't decode hex-encoded signature {}", signature);
            return false;
        }
    };

    // HMAC takes keys of any length, this can't actually fail
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Raw request body whose signature has been checked against the configured secret.
pub struct SignedGitHubPayload(pub Vec<u8>);

const LIMIT: ByteUnit = ByteUnit::Mebibyte(1);

#[rocket::async_trait]
impl<'r> FromData<'r> for SignedGitHubPayload {
    type Error = anyhow::Error;

    async fn from_data(request: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        trace!("received payload on GitHub webhook endpoint: {:?}", request);

        let signature = match request.headers().get_one(X_GITHUB_SIGNATURE) {
            Some(signature) if !signature.is_empty() => signature,
            _ => {
                trace!("couldn't locate {} header", X_GITHUB_SIGNATURE);
                return Outcome::Error((
                    Status::Unauthorized,
                    anyhow!("request header needs a signature"),
                ));
            }
        };

        let secret = match request.rocket().state::<GitHubSecret>() {
            Some(secret) => secret,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    anyhow!("GitHub secret isn't managed by rocket"),
                ))
            }
        };

        let size_limit = request.limits().get("json").unwrap_or(LIMIT);
        let content = match data.open(size_limit).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            // a truncated body can't be verified, so it gets the same answer as a bad signature
            Ok(_) => {
                let eof = io::ErrorKind::UnexpectedEof;
                trace!("payload was too big to verify");
                return Outcome::Error((
                    Status::Unauthorized,
                    io::Error::new(eof, "data limit exceeded").into(),
                ));
            }
            Err(e) => return Outcome::Error((Status::BadRequest, e.into())),
        };

        if !verify(&content, signature, secret.0.as_bytes()) {
            trace!("signature validation failed, stopping here...");
            return Outcome::Error((
                Status::Unauthorized,
                anyhow!("couldn't verify signature"),
            ));
        }

        trace!("validated GitHub payload");
        Outcome::Success(SignedGitHubPayload(content))
    }
}
