use base64::{Engine as _, engine::general_purpose::STANDARD};
use compact_str::CompactString;
use cscr::scrape::backoff;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::parse::{self, Outcome, Row};

const BASE: &str = "https://checkcoverage.apple.com";
const AUTH_HEADER: &str = "X-Apple-Auth-Token";
const RATE_LIMIT_MARKER: &str = "but we are currently unable to process";

const TOKEN_ATTEMPTS: u32 = 5;
const CAPTCHA_ATTEMPTS: u32 = 3;
const WRONG_CAPTCHA_LIMIT: u32 = 6;

pub struct Context {
    pub client: Client,
    pub lang: String,
}

pub async fn get_auth_token(client: &Client) -> Option<CompactString> {
    for attempt in 0..TOKEN_ATTEMPTS {
        let response = match client.get(BASE).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(target: "get token", "get token failed: {e}, retrying");
                backoff(attempt).await;
                continue;
            }
        };
        let Some(token) = response
            .headers()
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            tracing::error!(target: "get token", "no auth token in response (rate limited?), retrying");
            backoff(attempt).await;
            continue;
        };
        let token = CompactString::new(token);
        tracing::info!(target: "get token", "update token: {token}");
        return Some(token);
    }
    None
}

enum Captcha {
    Image(Vec<u8>),
    RateLimited,
}

fn decode_captcha(text: &str) -> anyhow::Result<Captcha> {
    #[derive(Deserialize)]
    struct Resp {
        binaryValue: String,
    }

    if text.contains(RATE_LIMIT_MARKER) {
        return Ok(Captcha::RateLimited);
    }

    let resp = serde_json::from_str::<Resp>(text)?;
    Ok(Captcha::Image(STANDARD.decode(resp.binaryValue)?))
}

async fn fetch_captcha(ctx: &Context, token: &str) -> anyhow::Result<Captcha> {
    let url = format!("{BASE}/api/v1/facade/captcha?type=image");
    let text = ctx
        .client
        .get(url)
        .header(AUTH_HEADER, token)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?
        .text()
        .await?;
    decode_captcha(&text)
}

async fn solve_captcha(ctx: &Context, token: &str) -> Option<CompactString> {
    for attempt in 0..CAPTCHA_ATTEMPTS {
        match fetch_captcha(ctx, token).await {
            Ok(Captcha::Image(image)) => {
                let text = match cscr::ocr::recognize(&image, &ctx.lang).await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(target: "captcha", "ocr failed: {e}");
                        continue;
                    }
                };
                let answer = cscr::ocr::clean_answer(&text);
                if answer.is_empty() {
                    tracing::warn!(target: "captcha", "no text detected in captcha, trying again ...");
                    continue;
                }
                tracing::info!(target: "captcha", "captcha answer: \x1b[36m{answer}\x1b[0m");
                return Some(answer);
            }
            Ok(Captcha::RateLimited) => {
                tracing::warn!(target: "captcha", "rate limit reached while fetching captcha, waiting ...");
                backoff(1).await;
            }
            Err(e) => {
                tracing::warn!(target: "captcha", "captcha fetch failed: {e}");
                backoff(attempt).await;
            }
        }
    }
    None
}

async fn submit_serial(
    ctx: &Context,
    token: &str,
    serial: &str,
    answer: &str,
) -> reqwest::Result<String> {
    #[derive(Serialize)]
    struct Payload<'a> {
        captchaAnswer: &'a str,
        captchaType: &'static str,
        serialNumber: &'a str,
    }

    let url = format!("{BASE}/api/v1/facade/coverage");
    ctx.client
        .post(url)
        .header(AUTH_HEADER, token)
        .json(&Payload {
            captchaAnswer: answer,
            captchaType: "image",
            serialNumber: serial,
        })
        .send()
        .await?
        .text()
        .await
}

pub async fn work(serial: &str, ctx: &Context) -> Option<Row> {
    let Some(mut token) = get_auth_token(&ctx.client).await else {
        tracing::warn!(target: "worker", "no auth token for {serial}, skipping");
        return None;
    };

    let mut wrong_captcha = 0u32;
    loop {
        let Some(answer) = solve_captcha(ctx, &token).await else {
            tracing::warn!(target: "worker", "maximum captcha attempts reached at {serial}, refreshing the connection ...");
            let Some(fresh) = get_auth_token(&ctx.client).await else {
                tracing::warn!(target: "worker", "no auth token for {serial}, skipping");
                return None;
            };
            token = fresh;
            continue;
        };

        let body = match submit_serial(ctx, &token, serial, &answer).await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(target: "worker", "coverage request for {serial} failed: {e:?}");
                return None;
            }
        };

        match parse::classify(&body) {
            Outcome::RateLimited => {
                tracing::warn!(target: "worker", "rate limit reached while checking {serial}, waiting ...");
                backoff(1).await;
            }
            Outcome::WrongCaptcha => {
                wrong_captcha += 1;
                tracing::info!(target: "worker", "invalid captcha at {serial}, trying again ... ({wrong_captcha}/{WRONG_CAPTCHA_LIMIT})");
                if wrong_captcha >= WRONG_CAPTCHA_LIMIT {
                    tracing::warn!(target: "worker", "maximum invalid captcha attempts reached at {serial}, refreshing the connection ...");
                    let Some(fresh) = get_auth_token(&ctx.client).await else {
                        tracing::warn!(target: "worker", "no auth token for {serial}, skipping");
                        return None;
                    };
                    token = fresh;
                    wrong_captcha = 0;
                }
            }
            Outcome::Unknown => {
                tracing::warn!(target: "worker", "unknown response at {serial}: {}", body.trim());
                return Row::from_outcome(serial, Outcome::Unknown);
            }
            outcome => return Row::from_outcome(serial, outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_captcha_image() {
        let body = r#"{"binaryValue":"aGVsbG8=","type":"image"}"#;
        let Ok(Captcha::Image(image)) = decode_captcha(body) else {
            panic!("expected image");
        };
        assert_eq!(image, b"hello");
    }

    #[test]
    fn decode_captcha_rate_limited() {
        let body =
            "<p>Sorry, but we are currently unable to process your request. Try again later.</p>";
        assert!(matches!(decode_captcha(body), Ok(Captcha::RateLimited)));
    }

    #[test]
    fn decode_captcha_rejects_garbage() {
        assert!(decode_captcha("<html>gateway timeout</html>").is_err());
        assert!(decode_captcha(r#"{"binaryValue":"!!!not base64!!!"}"#).is_err());
    }
}
