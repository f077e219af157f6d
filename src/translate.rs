use once_cell::sync::Lazy;
use std::time::Duration;

use crate::config::{Config, TargetLang};

static CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .expect("failed to build client")
});

/// Everything `translate` can report. All variants are recoverable and end up
/// as a toast or inline text; the process never dies over a failed call.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Please configure an API Key in settings")]
    Config,
    #[error("No text to translate")]
    EmptyInput,
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("API returned unexpected format")]
    Malformed,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(serde::Deserialize)]
struct Choice {
    #[serde(default)]
    message: ChoiceMessage,
}

#[derive(serde::Deserialize, Default)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// One-shot chat-completions client. Built per call from the current config so
/// settings edits apply to the next translation without restarting anything.
#[derive(Debug, Clone)]
pub struct Translator {
    api_url: String,
    api_key: String,
    model: String,
    target_lang: TargetLang,
}

impl Translator {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_url: cfg.api_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            target_lang: cfg.target_lang,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.api_url)
    }

    fn system_prompt(&self) -> String {
        format!(
            "You are a professional academic translator. Translate the given text to {}.\n\n\
             Rules:\n\
             1. Accurate translation preserving academic terminology\n\
             2. Natural and fluent output\n\
             3. Keep professional terms, add original in brackets if needed\n\
             4. Maintain paragraph structure\n\
             5. Output translation only, no explanations",
            self.target_lang
        )
    }

    fn user_prompt(&self, text: &str) -> String {
        format!("Translate to {}:\n\n{}", self.target_lang, text)
    }

    /// Single best-effort call: no retry, no backoff, no streaming. The four
    /// outcomes are a missing-key config error, an empty-input error, the
    /// parsed translation, or a wrapped transport/HTTP/format failure.
    pub async fn translate(&self, text: &str) -> Result<String, TranslateError> {
        if self.api_key.is_empty() {
            return Err(TranslateError::Config);
        }
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TranslateError::EmptyInput);
        }

        let system = self.system_prompt();
        let user = self.user_prompt(trimmed);
        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &system },
                ChatMessage { role: "user", content: &user },
            ],
            temperature: 0.3,
            max_tokens: 4096,
            stream: false,
        };

        let resp = CLIENT
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| TranslateError::Network(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .map(|env| env.error.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| {
                    if body.is_empty() {
                        status.canonical_reason().unwrap_or("request failed").to_string()
                    } else {
                        body
                    }
                });
            return Err(TranslateError::Http { status: status.as_u16(), message });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|_| TranslateError::Malformed)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(TranslateError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn translator(api_url: &str, api_key: &str) -> Translator {
        Translator {
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            target_lang: TargetLang::Chinese,
        }
    }

    fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    /// Minimal loopback server: accepts one connection, reads the full request
    /// (headers plus Content-Length body), answers with a canned response.
    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            let (mut stream, _) = match listener.accept() {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let mut remaining_body = loop {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break 0,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
                            let headers = String::from_utf8_lossy(&buf[..pos]).to_string();
                            let content_length = headers
                                .lines()
                                .find_map(|line| {
                                    let (name, value) = line.split_once(':')?;
                                    if name.trim().eq_ignore_ascii_case("content-length") {
                                        value.trim().parse::<usize>().ok()
                                    } else {
                                        None
                                    }
                                })
                                .unwrap_or(0);
                            break content_length.saturating_sub(buf.len() - pos - 4);
                        }
                    }
                }
            };
            while remaining_body > 0 {
                match stream.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => remaining_body = remaining_body.saturating_sub(n),
                }
            }
            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(resp.as_bytes());
            let _ = stream.flush();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn parses_successful_choice() {
        let base = serve_once("200 OK", r#"{"choices":[{"message":{"content":"X"}}]}"#);
        let t = translator(&base, "sk-test");
        let out = t.translate("hello").await.expect("translation");
        assert_eq!(out, "X");
    }

    #[tokio::test]
    async fn http_error_carries_status_and_parsed_message() {
        let base = serve_once("401 Unauthorized", r#"{"error":{"message":"bad key"}}"#);
        let t = translator(&base, "sk-test");
        let err = t.translate("hello").await.expect_err("should fail");
        let text = err.to_string();
        assert!(text.contains("401"), "missing status in: {text}");
        assert!(text.contains("bad key"), "missing message in: {text}");
    }

    #[tokio::test]
    async fn http_error_falls_back_to_raw_body() {
        let base = serve_once("500 Internal Server Error", "boom");
        let t = translator(&base, "sk-test");
        let err = t.translate("hello").await.expect_err("should fail");
        let text = err.to_string();
        assert!(text.contains("500"), "missing status in: {text}");
        assert!(text.contains("boom"), "missing body in: {text}");
    }

    #[tokio::test]
    async fn missing_api_key_short_circuits_without_network() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let t = translator(&base, "");
        let err = t.translate("hello").await.expect_err("should fail");
        assert!(matches!(err, TranslateError::Config));
        listener.set_nonblocking(true).expect("nonblocking");
        // Nothing ever connected, so there is no pending accept.
        assert_eq!(
            listener.accept().expect_err("no connection").kind(),
            std::io::ErrorKind::WouldBlock
        );
    }

    #[tokio::test]
    async fn whitespace_input_short_circuits_without_network() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let base = format!("http://{}", listener.local_addr().expect("addr"));
        let t = translator(&base, "sk-test");
        let err = t.translate("   \n\t ").await.expect_err("should fail");
        assert!(matches!(err, TranslateError::EmptyInput));
        listener.set_nonblocking(true).expect("nonblocking");
        assert_eq!(
            listener.accept().expect_err("no connection").kind(),
            std::io::ErrorKind::WouldBlock
        );
    }

    #[tokio::test]
    async fn unexpected_shape_is_malformed() {
        let base = serve_once("200 OK", "{}");
        let t = translator(&base, "sk-test");
        let err = t.translate("hello").await.expect_err("should fail");
        assert!(matches!(err, TranslateError::Malformed));
    }

    #[tokio::test]
    async fn empty_content_is_malformed() {
        let base = serve_once("200 OK", r#"{"choices":[{"message":{"content":"  "}}]}"#);
        let t = translator(&base, "sk-test");
        let err = t.translate("hello").await.expect_err("should fail");
        assert!(matches!(err, TranslateError::Malformed));
    }

    #[test]
    fn prompts_name_the_target_language() {
        let mut t = translator("https://api.siliconflow.cn", "sk-test");
        t.target_lang = TargetLang::Japanese;
        assert!(t.system_prompt().contains("Japanese"));
        assert!(t.user_prompt("hi").starts_with("Translate to Japanese:"));
        assert!(t.user_prompt("hi").ends_with("hi"));
    }

    #[test]
    fn endpoint_normalizes_trailing_slash() {
        let cfg = Config {
            api_url: "https://api.siliconflow.cn///".to_string(),
            ..Config::default()
        };
        let t = Translator::from_config(&cfg);
        assert_eq!(t.endpoint(), "https://api.siliconflow.cn/v1/chat/completions");
    }
}
