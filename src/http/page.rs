//! Static index page served at `/`.

use hyper::body::Bytes;

/// Provides the HTML document served at the root path.
pub trait IndexPage: Send + Sync {
    /// Render the page for a client that should connect to `ws_location`.
    fn render(&self, ws_location: &str) -> Bytes;
}

/// `ws://<host><path>`; falls back to `localhost` when `Host` is missing.
pub fn websocket_location(host: Option<&str>, path: &str) -> String {
    format!("ws://{}{}", host.unwrap_or("localhost"), path)
}

/// Minimal test client: a text box, a send button and a log of replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIndexPage;

impl IndexPage for DefaultIndexPage {
    fn render(&self, ws_location: &str) -> Bytes {
        Bytes::from(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>Web Socket Test</title></head>
<body>
<script type="text/javascript">
var socket;
if (window.WebSocket) {{
  socket = new WebSocket("{location}");
  socket.onmessage = function(event) {{
    var ta = document.getElementById('responseText');
    ta.value = ta.value + '\n' + event.data;
  }};
  socket.onopen = function(event) {{
    document.getElementById('responseText').value = "Web Socket opened!";
  }};
  socket.onclose = function(event) {{
    var ta = document.getElementById('responseText');
    ta.value = ta.value + "\nWeb Socket closed";
  }};
}} else {{
  alert("Your browser does not support Web Socket.");
}}

function send(message) {{
  if (!window.WebSocket) {{ return; }}
  if (socket.readyState == WebSocket.OPEN) {{
    socket.send(message);
  }} else {{
    alert("The socket is not open.");
  }}
}}
</script>
<form onsubmit="return false;">
<input type="text" name="message" value="Hello, World!"/>
<input type="button" value="Send Web Socket Data" onclick="send(this.form.message.value)"/>
<h3>Output</h3>
<textarea id="responseText" style="width:500px;height:300px;"></textarea>
</form>
</body>
</html>
"#,
            location = ws_location
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_uses_host_header() {
        assert_eq!(
            websocket_location(Some("example.com:8080"), "/websocket"),
            "ws://example.com:8080/websocket"
        );
        assert_eq!(websocket_location(None, "/ws"), "ws://localhost/ws");
    }

    #[test]
    fn page_embeds_location() {
        let body = DefaultIndexPage.render("ws://h/websocket");
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains(r#"new WebSocket("ws://h/websocket")"#));
        assert!(text.starts_with("<!DOCTYPE html>"));
    }
}
