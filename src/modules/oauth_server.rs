use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::modules::oauth::{OidcClient, Pkce, TokenResponse};

fn oauth_success_html() -> &'static str {
    "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
    <html>\
    <body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
        <h1 style='color: green;'>Signed in to Donut</h1>\
        <p>You can close this window and return to the console.</p>\
    </body>\
    </html>"
}

fn oauth_fail_html() -> &'static str {
    "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
    <html>\
    <body style='font-family: sans-serif; text-align: center; padding: 50px;'>\
        <h1 style='color: red;'>Sign-in failed</h1>\
        <p>No authorization code was received. Return to the console and try again.</p>\
    </body>\
    </html>"
}

/// Browser callback listener for one authorization-code login
pub struct LoopbackListener {
    listener: TcpListener,
    redirect_uri: String,
}

impl LoopbackListener {
    /// Listen on an ephemeral IPv4 loopback port
    pub async fn bind() -> AppResult<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| AppError::OAuth(format!("Failed to bind local port: {}", e)))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            redirect_uri: format!("http://127.0.0.1:{}/oauth-callback", port),
        })
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the browser redirect and return the authorization code.
    ///
    /// Requests that are not the callback (favicon probes and the like) are
    /// answered and ignored.
    pub async fn wait_for_code(self, expected_state: &str) -> AppResult<String> {
        loop {
            let (mut stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|e| AppError::OAuth(format!("Failed to accept connection: {}", e)))?;

            let Some(target) = read_request_target(&mut stream).await else {
                continue;
            };

            let Some(result) = parse_callback(&target, expected_state) else {
                let _ = stream
                    .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
                continue;
            };

            let page = if result.is_ok() {
                oauth_success_html()
            } else {
                oauth_fail_html()
            };
            let _ = stream.write_all(page.as_bytes()).await;
            let _ = stream.flush().await;

            return result;
        }
    }
}

async fn read_request_target(stream: &mut TcpStream) -> Option<String> {
    let mut buffer = [0u8; 4096];
    let read = stream.read(&mut buffer).await.ok()?;
    let request = String::from_utf8_lossy(&buffer[..read]);
    request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
}

/// `None` when `target` is not the callback path
fn parse_callback(target: &str, expected_state: &str) -> Option<AppResult<String>> {
    let url = Url::parse(&format!("http://127.0.0.1{}", target)).ok()?;
    if url.path() != "/oauth-callback" {
        return None;
    }

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    };

    if let Some(error) = param("error") {
        let description = param("error_description").unwrap_or_default();
        return Some(Err(AppError::OAuth(format!(
            "Authorization server returned {}: {}",
            error, description
        ))));
    }

    if param("state").as_deref() != Some(expected_state) {
        return Some(Err(AppError::OAuth(
            "Callback state does not match this login".to_string(),
        )));
    }

    Some(param("code").ok_or_else(|| {
        AppError::OAuth("Failed to get Authorization Code in callback".to_string())
    }))
}

/// Interactive authorization-code login with PKCE.
///
/// Prints the authorization URL, waits for the browser to come back, and
/// exchanges the code. Ctrl-C aborts the wait.
pub async fn run_login_flow(oidc: &OidcClient) -> AppResult<TokenResponse> {
    let listener = LoopbackListener::bind().await?;
    let redirect_uri = listener.redirect_uri().to_string();
    let pkce = Pkce::generate();
    let state = uuid::Uuid::new_v4().simple().to_string();
    let auth_url = oidc.get_auth_url(&redirect_uri, &pkce, &state)?;

    eprintln!("Open the following address in a browser to sign in:");
    eprintln!();
    eprintln!("  {}", auth_url);
    eprintln!();
    tracing::debug!("Waiting for authorization callback on {}", redirect_uri);

    let code = tokio::select! {
        code = listener.wait_for_code(&state) => code?,
        _ = tokio::signal::ctrl_c() => {
            return Err(AppError::OAuth("Login cancelled".to_string()));
        }
    };

    oidc.exchange_code(&code, &redirect_uri, &pkce.verifier).await
}
