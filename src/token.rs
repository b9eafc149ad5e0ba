//! Compact three-segment signed tokens handed to channel clients.
//!
//! Wire format: `<b64url(header)>.<b64url(claims)>.<b64url(signature)>`, where the header is
//! always the compact JSON `{"typ":"JWT","alg":"RS256"}` and the signature is produced by the
//! [`Credentials`] signing identity over the ASCII bytes of `<header>.<claims>`.
//!
//! Verification re-signs the payload and compares the signatures in constant time, which works
//! because RS256 (PKCS#1 v1.5) signatures are deterministic.

// crates.io
use base64::{
	Engine as _,
	alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use subtle::ConstantTimeEq;
// self
use crate::{
	_prelude::*,
	credentials::Credentials,
	error::TokenError,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Encoded header shared by every token: base64url of `{"typ":"JWT","alg":"RS256"}`.
pub const TOKEN_HEADER: &str = "eyJ0eXAiOiJKV1QiLCJhbGciOiJSUzI1NiJ9";
/// Audience claim stamped into every token.
pub const IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/";

/// Claims object carried in the payload segment.
pub type Claims = serde_json::Map<String, Value>;

// Unpadded on the way out; tolerant of padding on the way in.
const B64: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new()
		.with_encode_padding(false)
		.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Serializes `value` as compact JSON and encodes it as one token segment.
pub fn encode(value: &Value) -> String {
	B64.encode(value.to_string())
}

/// Decodes one token segment back into JSON.
pub fn decode(segment: &str) -> Result<Value> {
	let bytes =
		B64.decode(segment).map_err(|e| TokenError::malformed_by("segment is not base64url", e))?;

	serde_json::from_slice(&bytes)
		.map_err(|e| TokenError::malformed_by("segment is not JSON", e).into())
}

/// Mints a token valid for `duration_minutes`, signed by `credentials`.
///
/// Reserved claims (`iss`, `sub`, `aud`, `iat`, `exp`) are filled in first and `claims` is
/// merged over them, so a caller-supplied key wins. Range checks on the duration belong to the
/// caller.
pub async fn build_token(
	credentials: &Credentials,
	claims: &Claims,
	duration_minutes: u32,
) -> Result<String> {
	let issuer = credentials.signer_identity();
	let issued_at = OffsetDateTime::now_utc().unix_timestamp();
	let mut payload = Claims::new();

	payload.insert("iss".into(), issuer.into());
	payload.insert("sub".into(), issuer.into());
	payload.insert("aud".into(), IDENTITY_ENDPOINT.into());
	payload.insert("iat".into(), issued_at.into());
	payload.insert("exp".into(), (issued_at + i64::from(duration_minutes) * 60).into());
	payload.extend(claims.iter().map(|(k, v)| (k.clone(), v.clone())));

	let signing_input = format!("{TOKEN_HEADER}.{}", encode(&Value::Object(payload)));
	let signature = credentials.sign_bytes(signing_input.as_bytes()).await?;

	Ok(format!("{signing_input}.{}", B64.encode(signature)))
}

/// Parses `token` and, when `verify` is set, checks its signature against `credentials`.
///
/// With `verify` off the claims are returned without any signature check. That mode exists
/// for identities that cannot re-sign locally and must be treated as untrusted input.
pub async fn decode_token(credentials: &Credentials, token: &str, verify: bool) -> Result<Claims> {
	const KIND: OpKind = OpKind::Verify;

	let (signing_input, claims, signature) = split(token)?;

	if verify {
		let span = OpSpan::new(KIND, "decode_token");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span.instrument(verify_signature(credentials, signing_input, signature)).await;

		obs::record_result(KIND, &result);
		result?;
	}

	claims_object(claims)
}

/// Parses `token` without checking its signature.
pub fn decode_unverified(token: &str) -> Result<Claims> {
	let (_, claims, _) = split(token)?;

	claims_object(claims)
}

// Returns `(header.payload, payload, signature)`.
fn split(token: &str) -> Result<(&str, &str, &str), TokenError> {
	let mut parts = token.split('.');
	let (Some(header), Some(claims), Some(signature), None) =
		(parts.next(), parts.next(), parts.next(), parts.next())
	else {
		return Err(TokenError::malformed("expected three segments"));
	};

	if header != TOKEN_HEADER {
		return Err(TokenError::malformed("unexpected header"));
	}

	Ok((&token[..header.len() + 1 + claims.len()], claims, signature))
}

async fn verify_signature(
	credentials: &Credentials,
	signing_input: &str,
	signature: &str,
) -> Result<()> {
	let given = B64
		.decode(signature)
		.map_err(|e| TokenError::malformed_by("signature is not base64url", e))?;
	let expected = credentials.sign_bytes(signing_input.as_bytes()).await?;

	if bool::from(given.ct_eq(&expected)) {
		Ok(())
	} else {
		Err(TokenError::InvalidSignature.into())
	}
}

fn claims_object(segment: &str) -> Result<Claims> {
	match decode(segment)? {
		Value::Object(claims) => Ok(claims),
		_ => Err(TokenError::malformed("claims are not an object").into()),
	}
}
