use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, space0, space1},
    combinator::{map, opt},
    multi::separated_list1,
    sequence::{delimited, preceded},
};

/// Pseudo-header signed when a signature lists no headers.
pub const DEFAULT_SIGNED_HEADER: &str = "(created)";

/// Parameters of an HTTP `Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub key_id: String,
    pub algorithm: Option<String>,
    /// Lower-cased, in signing order.
    pub headers: Vec<String>,
    pub signature: String,
    pub created: Option<u64>,
    pub expires: Option<u64>,
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(is_token_char).parse(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"')).parse(input)
}

fn param(input: &str) -> IResult<&str, (&str, &str)> {
    map((token, char('='), alt((quoted, digit1))), |(k, _, v)| (k, v)).parse(input)
}

fn param_list(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list1((space0, char(','), space0), param).parse(input)
}

/// Accepts both the bare `Signature` header value and the
/// `Authorization: Signature ...` form.
fn signature_header(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    preceded(opt((tag("Signature"), space1)), param_list).parse(input)
}

fn number(name: &str, value: &str) -> Result<u64, String> {
    value
        .parse()
        .map_err(|_| format!("\"{name}\" must be an integer timestamp"))
}

pub fn parse_signature(header: &str) -> Result<SignatureParams, String> {
    let params = match signature_header(header.trim()) {
        Ok(("", params)) => params,
        Ok((rest, _)) => return Err(format!("unexpected trailing: {rest}")),
        Err(e) => return Err(format!("parse error: {e}")),
    };

    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;
    let mut created = None;
    let mut expires = None;

    for (name, value) in params {
        let seen = match name {
            "keyId" => key_id.replace(value.to_owned()).is_some(),
            "algorithm" => algorithm.replace(value.to_owned()).is_some(),
            "headers" => headers
                .replace(
                    value
                        .split_ascii_whitespace()
                        .map(str::to_ascii_lowercase)
                        .collect::<Vec<_>>(),
                )
                .is_some(),
            "signature" => signature.replace(value.to_owned()).is_some(),
            "created" => created.replace(number(name, value)?).is_some(),
            "expires" => expires.replace(number(name, value)?).is_some(),
            // Unknown parameters are ignored.
            _ => false,
        };
        if seen {
            return Err(format!("duplicate parameter \"{name}\""));
        }
    }

    let key_id = key_id.filter(|k| !k.is_empty()).ok_or("missing \"keyId\"")?;
    let signature = signature
        .filter(|s| !s.is_empty())
        .ok_or("missing \"signature\"")?;
    let headers = match headers {
        Some(h) if !h.is_empty() => h,
        _ => vec![DEFAULT_SIGNED_HEADER.to_owned()],
    };

    Ok(SignatureParams {
        key_id,
        algorithm,
        headers,
        signature,
        created,
        expires,
    })
}
