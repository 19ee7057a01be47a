//! DevTools-protocol page renderer.
//!
//! Talks to an externally-managed headless browser over its DevTools
//! websocket. Each render creates an isolated browser context carrying the
//! session's fingerprint and cookies, navigates, snapshots the content
//! containers, and disposes the context unconditionally.

use super::dom::{DomNode, DomSnapshot};
use super::session::{Session, STEALTH_SCRIPT};
use super::{PageRenderer, RenderWait};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

const CALL_TIMEOUT: Duration = Duration::from_secs(15);
const MARKER_POLL_INTERVAL: Duration = Duration::from_millis(500);
const SCROLL_SETTLE: Duration = Duration::from_millis(1500);

/// Serializes every `article` container on the page into a [`DomNode`] tree,
/// keeping the attributes the adapters extract by.
const SNAPSHOT_SCRIPT: &str = r#"
(() => {
  const keep = ['href', 'datetime', 'aria-label', 'role'];
  const walk = (el) => {
    const node = { tag: el.tagName.toLowerCase(), attrs: {}, text: null, children: [] };
    const tid = el.getAttribute('data-testid');
    if (tid) node.test_id = tid;
    for (const name of keep) {
      const v = el.getAttribute(name);
      if (v) node.attrs[name] = v;
    }
    for (const child of el.childNodes) {
      if (child.nodeType === 3) {
        const t = child.textContent.trim();
        if (t) node.text = node.text ? node.text + ' ' + t : t;
      } else if (child.nodeType === 1) {
        node.children.push(walk(child));
      }
    }
    return node;
  };
  const root = { tag: 'root', attrs: {}, text: null, children: [] };
  [...document.querySelectorAll('article')]
    .filter((a) => !a.parentElement.closest('article'))
    .forEach((a) => root.children.push(walk(a)));
  return JSON.stringify(root);
})()
"#;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// One DevTools websocket connection with request/response correlation.
struct CdpConnection {
    write: WsSink,
    read: WsStream,
    next_id: u64,
}

impl CdpConnection {
    async fn connect(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .context("Failed to connect to DevTools websocket")?;
        let (write, read) = ws_stream.split();
        Ok(Self {
            write,
            read,
            next_id: 1,
        })
    }

    /// Issue one protocol command and wait for its response, discarding
    /// interleaved events.
    async fn call(
        &mut self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let mut message = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(sid) = session_id {
            message["sessionId"] = json!(sid);
        }

        self.write
            .send(Message::Text(message.to_string()))
            .await
            .with_context(|| format!("Failed to send {}", method))?;

        timeout(CALL_TIMEOUT, self.wait_for_response(id))
            .await
            .map_err(|_| anyhow!("DevTools call timed out: {}", method))?
    }

    async fn wait_for_response(&mut self, id: u64) -> Result<Value> {
        while let Some(message) = self.read.next().await {
            let message = message.context("DevTools websocket read failed")?;
            let text = match message {
                Message::Text(text) => text,
                _ => continue,
            };
            let value: Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => continue,
            };
            if value.get("id").and_then(Value::as_u64) != Some(id) {
                continue; // protocol event, not our response
            }
            if let Some(error) = value.get("error") {
                bail!("DevTools error: {}", error);
            }
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }
        bail!("DevTools websocket closed mid-call")
    }
}

/// [`PageRenderer`] backed by a real browser's DevTools endpoint.
pub struct CdpRenderer {
    devtools_url: String,
    http: reqwest::Client,
}

impl CdpRenderer {
    pub fn new(devtools_url: &str) -> Self {
        Self {
            devtools_url: devtools_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn browser_ws_url(&self) -> Result<String> {
        let version: Value = self
            .http
            .get(format!("{}/json/version", self.devtools_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .context("DevTools endpoint unreachable")?
            .json()
            .await
            .context("Malformed DevTools version payload")?;

        version
            .get("webSocketDebuggerUrl")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| anyhow!("DevTools version payload missing webSocketDebuggerUrl"))
    }

    async fn render_in_context(
        &self,
        conn: &mut CdpConnection,
        context_id: &str,
        url: &str,
        session: &Session,
        wait: &RenderWait,
    ) -> Result<DomSnapshot> {
        let target = conn
            .call(
                None,
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": context_id }),
            )
            .await?;
        let target_id = target
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target.createTarget returned no targetId"))?
            .to_string();

        let attached = conn
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target.attachToTarget returned no sessionId"))?
            .to_string();
        let sid = Some(session_id.as_str());

        // Inject authentication cookies into the isolated context.
        if !session.cookies.is_empty() {
            let cookies: Vec<Value> = session
                .cookies
                .iter()
                .map(|c| {
                    json!({
                        "name": c.name,
                        "value": c.value,
                        "domain": c.domain,
                        "path": "/",
                        "secure": true,
                        "httpOnly": true,
                    })
                })
                .collect();
            conn.call(
                None,
                "Storage.setCookies",
                json!({ "cookies": cookies, "browserContextId": context_id }),
            )
            .await?;
        }

        // Apply the fingerprint before any page script runs.
        let (width, height) = session.fingerprint.viewport;
        conn.call(
            sid,
            "Emulation.setDeviceMetricsOverride",
            json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": false }),
        )
        .await?;
        conn.call(
            sid,
            "Emulation.setTimezoneOverride",
            json!({ "timezoneId": session.fingerprint.timezone }),
        )
        .await?;
        conn.call(
            sid,
            "Emulation.setLocaleOverride",
            json!({ "locale": session.fingerprint.locale }),
        )
        .await?;
        conn.call(
            sid,
            "Network.setUserAgentOverride",
            json!({
                "userAgent": session.fingerprint.user_agent,
                "acceptLanguage": session.fingerprint.locale,
            }),
        )
        .await?;
        conn.call(sid, "Page.enable", json!({})).await?;
        conn.call(
            sid,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": STEALTH_SCRIPT }),
        )
        .await?;

        conn.call(sid, "Page.navigate", json!({ "url": url })).await?;

        // Bounded wait for the content marker; a slow or blocked page
        // degrades to the fixed settle delay instead of hanging.
        let probe = format!(
            "document.querySelector('[data-testid=\"{}\"]') !== null",
            wait.marker
        );
        let mut marker_found = false;
        let deadline = tokio::time::Instant::now() + wait.timeout;
        while tokio::time::Instant::now() < deadline {
            if self.evaluate_bool(conn, &session_id, &probe).await? {
                marker_found = true;
                break;
            }
            sleep(MARKER_POLL_INTERVAL).await;
        }
        if !marker_found {
            debug!(url = url, marker = %wait.marker, "Content marker never appeared, settling");
            sleep(wait.settle).await;
        }

        for _ in 0..wait.scroll_cycles {
            self.evaluate(conn, &session_id, "window.scrollBy(0, 1000); true")
                .await?;
            sleep(SCROLL_SETTLE).await;
        }

        let raw = self
            .evaluate(conn, &session_id, SNAPSHOT_SCRIPT)
            .await?
            .as_str()
            .map(String::from)
            .ok_or_else(|| anyhow!("Snapshot script returned a non-string value"))?;
        let root: DomNode =
            serde_json::from_str(&raw).context("Malformed DOM snapshot payload")?;
        Ok(DomSnapshot { root })
    }

    async fn evaluate(
        &self,
        conn: &mut CdpConnection,
        session_id: &str,
        expression: &str,
    ) -> Result<Value> {
        let result = conn
            .call(
                Some(session_id),
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn evaluate_bool(
        &self,
        conn: &mut CdpConnection,
        session_id: &str,
        expression: &str,
    ) -> Result<bool> {
        Ok(self
            .evaluate(conn, session_id, expression)
            .await?
            .as_bool()
            .unwrap_or(false))
    }
}

#[async_trait]
impl PageRenderer for CdpRenderer {
    async fn render(
        &self,
        url: &str,
        session: &Session,
        wait: &RenderWait,
    ) -> Result<DomSnapshot> {
        let ws_url = self.browser_ws_url().await?;
        let mut conn = CdpConnection::connect(&ws_url).await?;

        let context = conn
            .call(
                None,
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": true }),
            )
            .await?;
        let context_id = context
            .get("browserContextId")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Target.createBrowserContext returned no id"))?
            .to_string();

        let result = self
            .render_in_context(&mut conn, &context_id, url, session, wait)
            .await;

        // Teardown runs on every exit path; the context owns all targets.
        if let Err(e) = conn
            .call(
                None,
                "Target.disposeBrowserContext",
                json!({ "browserContextId": context_id }),
            )
            .await
        {
            warn!(error = %e, "Failed to dispose browser context");
        }

        result
    }
}
