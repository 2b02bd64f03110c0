//! HTTP server for the Titanic agent
//! Simple HTTP server using tokio and basic HTTP handling

use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use titanic_agent::agent_service::AgentService;
use titanic_agent::config::Config;
use titanic_agent::error::AgentError;
use titanic_agent::llm::LlmClient;
use titanic_agent::render::PlottersRenderer;
use titanic_agent::table::TabularStore;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize)]
struct ChatRequest {
    question: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    let store = Arc::new(TabularStore::load(&config.data_path)?);
    let service = Arc::new(AgentService::new(
        store,
        Arc::new(PlottersRenderer::default()),
        Arc::new(LlmClient::from_config(&config)),
    ));

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on {}", config.bind_addr);

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("New connection from {}", addr);
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            handle_connection(stream, service).await;
        });
    }
}

async fn handle_connection(mut stream: TcpStream, service: Arc<AgentService>) {
    match read_request(&mut stream).await {
        Ok(request) => {
            let response = handle_request(&request, &service).await;
            if let Err(e) = stream.write_all(response.as_bytes()).await {
                error!("Failed to write response: {}", e);
            }
        }
        Err(e) => {
            error!("Failed to read from stream: {}", e);
        }
    }
}

/// Read until the headers and a Content-Length worth of body have arrived.
async fn read_request(stream: &mut TcpStream) -> std::io::Result<String> {
    const MAX_REQUEST_BYTES: usize = 1_048_576;

    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let size = stream.read(&mut chunk).await?;
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);
        if request_complete(&buffer) || buffer.len() > MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

fn request_complete(buffer: &[u8]) -> bool {
    let Some(header_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&buffer[..header_end]);
    let content_length = headers
        .lines()
        .skip(1)
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.trim().eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    buffer.len() >= header_end + 4 + content_length
}

async fn handle_request(request: &str, service: &AgentService) -> String {
    let lines: Vec<&str> = request.lines().collect();
    if lines.is_empty() {
        return create_response(400, "Bad Request", "{}");
    }

    let parts: Vec<&str> = lines[0].split_whitespace().collect();
    if parts.len() < 2 {
        return create_response(400, "Bad Request", "{}");
    }

    let method = parts[0];
    let mut path = parts[1].to_string();
    if let Some(query_start) = path.find('?') {
        path.truncate(query_start);
    }
    let path = path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };

    match (method, path) {
        ("GET", "/health") => create_response(200, "OK", r#"{"status":"ok"}"#),
        ("GET", "/metrics") => {
            let body = service.metrics().snapshot().to_string();
            create_response(200, "OK", &body)
        }
        ("POST", "/chat") => handle_chat(request, service).await,
        ("OPTIONS", _) => create_response(200, "OK", ""),
        _ => {
            error!("404: {} {} not found", method, path);
            create_response(
                404,
                "Not Found",
                &format!(r#"{{"error":"Endpoint not found: {} {}"}}"#, method, path),
            )
        }
    }
}

async fn handle_chat(request: &str, service: &AgentService) -> String {
    let body_start = request
        .find("\r\n\r\n")
        .map(|i| i + 4)
        .unwrap_or(request.len());
    let body = request[body_start..].trim();

    let chat: ChatRequest = match serde_json::from_str(body) {
        Ok(chat) => chat,
        Err(_) => {
            return create_response(422, "Unprocessable Entity", r#"{"error":"Invalid request"}"#)
        }
    };

    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    let start = Instant::now();
    info!(request_id = %request_id, query = %chat.question, "chat_received");

    match service.run(&chat.question).await {
        Ok(reply) => {
            let latency = (start.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
            info!(
                request_id = %request_id,
                query = %chat.question,
                latency_seconds = latency,
                visualization = reply.chart.is_some(),
                "chat_success"
            );
            match serde_json::to_string(&reply) {
                Ok(body) => create_response(200, "OK", &body),
                Err(e) => {
                    error!(request_id = %request_id, "Failed to serialize response: {}", e);
                    create_response(
                        500,
                        "Internal Server Error",
                        r#"{"error":"Failed to process request"}"#,
                    )
                }
            }
        }
        Err(e) => {
            error!(request_id = %request_id, query = %chat.question, error = %e, "chat_failed");
            let (status, status_text, message) = match e {
                AgentError::Timeout => (504, "Gateway Timeout", "Request timeout."),
                AgentError::InvalidRequest(_) => (422, "Unprocessable Entity", "Invalid request"),
                _ => (500, "Internal Server Error", "Failed to process request"),
            };
            create_response(status, status_text, &format!(r#"{{"error":"{}"}}"#, message))
        }
    }
}

fn create_response(status: u16, status_text: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: application/json\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Access-Control-Allow-Headers: Content-Type\r\n\
         Content-Length: {}\r\n\
         \r\n\
         {}",
        status,
        status_text,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_complete_waits_for_body() {
        let partial = b"POST /chat HTTP/1.1\r\nContent-Length: 10\r\n\r\n{\"q\"";
        assert!(!request_complete(partial));
        let full = b"POST /chat HTTP/1.1\r\nContent-Length: 4\r\n\r\nabcd";
        assert!(request_complete(full));
    }

    #[test]
    fn request_complete_without_body() {
        let get = b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert!(request_complete(get));
    }
}
