//! Client side of the Git smart-HTTP protocol: reference discovery,
//! want/have negotiation with side-band demultiplexing, and the
//! receive-pack push exchange with its status report.

use bytes::{Bytes, BytesMut};

use super::{
    http::AuthedTransport,
    pkt::{PktLine, line_text, read_pkt_line, write_flush, write_pkt_line, write_pkt_line_str},
    types::{
        Capability, CapabilitySet, ProgressSink, RefDiscovery, RemoteRef, ServiceType, SideBand,
    },
};
use crate::{
    errors::GitError,
    hash::{HashKind, ObjectHash},
};

/// Agent string advertised in capability lists.
pub const AGENT: &str = "agent=git-embed/0.1.0";

/// Options for one fetch exchange.
#[derive(Default)]
pub struct FetchPackOptions {
    /// Nonzero adds a `deepen <n>` line and records shallow markers.
    pub depth: Option<u32>,
    /// Ask the server to suppress progress chatter.
    pub quiet: bool,
    /// Receives channel-2 progress text.
    pub progress: Option<ProgressSink>,
}

/// Result of a fetch exchange.
#[derive(Debug, Default)]
pub struct FetchPackResult {
    pub pack: Vec<u8>,
    /// Commits the server reported as new shallow boundary points.
    pub shallow: Vec<ObjectHash>,
    /// Boundary points the server lifted.
    pub unshallow: Vec<ObjectHash>,
    /// Haves the server acknowledged as common.
    pub common: Vec<ObjectHash>,
}

/// One ref update pushed to the remote; the zero id encodes create (as
/// `old`) or delete (as `new`).
#[derive(Debug, Clone)]
pub struct RefUpdateCommand {
    pub old: ObjectHash,
    pub new: ObjectHash,
    pub name: String,
}

/// Parsed receive-pack status report.
#[derive(Debug, Default)]
pub struct PushReport {
    pub unpack_ok: bool,
    pub unpack_error: Option<String>,
    /// Per-ref outcome: `Ok` for `ok <ref>`, `Err(reason)` for `ng`.
    pub ref_results: Vec<(String, Result<(), String>)>,
}

impl PushReport {
    pub fn all_ok(&self) -> bool {
        self.unpack_ok && self.ref_results.iter().all(|(_, r)| r.is_ok())
    }
}

/// A smart-HTTP client bound to one remote URL and one repository hash
/// width.
pub struct SmartHttpClient<'a> {
    transport: &'a AuthedTransport,
    base_url: String,
    kind: HashKind,
}

impl<'a> SmartHttpClient<'a> {
    pub fn new(transport: &'a AuthedTransport, base_url: &str, kind: HashKind) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            kind,
        }
    }

    /// `GET <base>/info/refs?service=…`: validate the service banner and
    /// parse the advertisement into refs plus a capability record.
    pub async fn discover(&self, service: ServiceType) -> Result<RefDiscovery, GitError> {
        let url = format!("{}/info/refs?service={service}", self.base_url);
        let response = self.transport.send("GET", &url, &[], None).await?;

        let expected_type = format!("application/x-{service}-advertisement");
        match response.header("content-type") {
            Some(content_type) if content_type == expected_type => {}
            other => {
                return Err(GitError::ProtocolError(format!(
                    "{url} answered content-type {other:?}, expected {expected_type}"
                )));
            }
        }

        let mut body = response.collect_body().await?;

        match read_pkt_line(&mut body)? {
            Some(PktLine::Data(payload)) => {
                let banner = line_text(&payload)?;
                if banner != format!("# service={service}") {
                    return Err(GitError::ProtocolError(format!(
                        "advertisement opened with `{banner}` instead of the service banner"
                    )));
                }
            }
            other => {
                return Err(GitError::ProtocolError(format!(
                    "advertisement must open with the service banner, got {other:?}"
                )));
            }
        }
        match read_pkt_line(&mut body)? {
            Some(PktLine::Flush) => {}
            other => {
                return Err(GitError::ProtocolError(format!(
                    "expected flush after service banner, got {other:?}"
                )));
            }
        }

        let mut discovery = RefDiscovery::default();
        let mut first_ref = true;
        loop {
            match read_pkt_line(&mut body)? {
                None | Some(PktLine::Flush) => break,
                Some(PktLine::Delim | PktLine::ResponseEnd) => continue,
                Some(PktLine::Data(payload)) => {
                    let (ref_part, caps_tail) = match payload.iter().position(|b| *b == 0) {
                        Some(nul) => (
                            Bytes::copy_from_slice(&payload[..nul]),
                            Some(String::from_utf8_lossy(&payload[nul + 1..]).to_string()),
                        ),
                        None => (payload.clone(), None),
                    };
                    if first_ref {
                        let tail = caps_tail.ok_or_else(|| {
                            GitError::ProtocolError(
                                "first advertised ref carries no capability tail".to_string(),
                            )
                        })?;
                        discovery.capabilities = CapabilitySet::parse(&tail);
                        first_ref = false;
                    }

                    let text = line_text(&ref_part)?;
                    let (id_hex, name) = text.split_once(' ').ok_or_else(|| {
                        GitError::ProtocolError(format!("malformed ref line `{text}`"))
                    })?;
                    // `capabilities^{}` is the placeholder of an empty
                    // repository; peeled tag rows are derived data.
                    if name == "capabilities^{}" || name.ends_with("^{}") {
                        continue;
                    }
                    discovery.refs.push(RemoteRef {
                        name: name.to_string(),
                        id_hex: id_hex.to_string(),
                    });
                }
            }
        }

        if let Some(format) = &discovery.capabilities.object_format
            && format.as_str() != self.kind.as_str()
        {
            return Err(GitError::ProtocolError(format!(
                "remote uses object-format {format}, repository is {}",
                self.kind
            )));
        }

        tracing::debug!(refs = discovery.refs.len(), %service, "discovery complete");
        Ok(discovery)
    }

    /// Negotiate wants/haves against an upload-pack discovery and
    /// download the pack stream.
    pub async fn fetch_pack(
        &self,
        discovery: &RefDiscovery,
        wants: &[ObjectHash],
        haves: &[ObjectHash],
        options: &FetchPackOptions,
    ) -> Result<FetchPackResult, GitError> {
        if wants.is_empty() {
            return Err(GitError::InvalidArgument("nothing to fetch".to_string()));
        }

        let caps = &discovery.capabilities;
        let enabled = caps.enable_for_fetch(options.depth.is_some(), options.quiet);
        let enabled_tail = {
            let mut words: Vec<String> = enabled.iter().map(|c| c.to_string()).collect();
            words.push(AGENT.to_string());
            words.join(" ")
        };

        let mut request = BytesMut::new();
        for (i, want) in wants.iter().enumerate() {
            if i == 0 {
                write_pkt_line_str(&mut request, &format!("want {want} {enabled_tail}\n"));
            } else {
                write_pkt_line_str(&mut request, &format!("want {want}\n"));
            }
        }
        if let Some(depth) = options.depth {
            write_pkt_line_str(&mut request, &format!("deepen {depth}\n"));
        }
        write_flush(&mut request);
        for have in haves {
            write_pkt_line_str(&mut request, &format!("have {have}\n"));
        }
        write_pkt_line_str(&mut request, "done\n");

        let url = format!("{}/git-upload-pack", self.base_url);
        let headers = vec![
            (
                "Content-Type".to_string(),
                "application/x-git-upload-pack-request".to_string(),
            ),
            (
                "Accept".to_string(),
                "application/x-git-upload-pack-result".to_string(),
            ),
        ];
        let response = self
            .transport
            .send("POST", &url, &headers, Some(request.freeze()))
            .await?;
        let body = response.collect_body().await?;

        let side_band = enabled
            .iter()
            .any(|c| matches!(c, Capability::SideBand | Capability::SideBand64k));
        self.parse_fetch_response(body, side_band, options.progress.as_ref())
    }

    /// Demultiplex the upload-pack response: shallow markers and ACK
    /// lines first, then pack bytes — side-band framed or raw after the
    /// final ACK/NAK.
    fn parse_fetch_response(
        &self,
        mut body: Bytes,
        side_band: bool,
        progress: Option<&ProgressSink>,
    ) -> Result<FetchPackResult, GitError> {
        let mut result = FetchPackResult::default();
        let mut negotiation_done = false;

        loop {
            if !side_band && negotiation_done {
                // Without side-band the pack follows unframed.
                result.pack.extend_from_slice(&body);
                break;
            }
            match read_pkt_line(&mut body)? {
                None => break,
                Some(PktLine::Flush | PktLine::Delim | PktLine::ResponseEnd) => continue,
                Some(PktLine::Data(payload)) => {
                    if payload.is_empty() {
                        continue;
                    }
                    if side_band && negotiation_done {
                        match SideBand::from_byte(payload[0]) {
                            Some(SideBand::PackData) => {
                                result.pack.extend_from_slice(&payload[1..]);
                            }
                            Some(SideBand::Progress) => {
                                let text = String::from_utf8_lossy(&payload[1..]).to_string();
                                tracing::debug!(target: "git_embed::progress", "{}", text.trim_end());
                                if let Some(sink) = progress {
                                    sink(&text);
                                }
                            }
                            Some(SideBand::Fatal) => {
                                return Err(GitError::ProtocolError(format!(
                                    "server: {}",
                                    String::from_utf8_lossy(&payload[1..]).trim_end()
                                )));
                            }
                            None => {
                                return Err(GitError::ProtocolError(format!(
                                    "unknown side-band channel {}",
                                    payload[0]
                                )));
                            }
                        }
                        continue;
                    }

                    let text = line_text(&payload)?;
                    if let Some(rest) = text.strip_prefix("shallow ") {
                        result.shallow.push(rest.parse()?);
                    } else if let Some(rest) = text.strip_prefix("unshallow ") {
                        result.unshallow.push(rest.parse()?);
                    } else if let Some(rest) = text.strip_prefix("ACK ") {
                        let mut words = rest.split(' ');
                        let id: ObjectHash = words
                            .next()
                            .ok_or_else(|| {
                                GitError::ProtocolError(format!("malformed ACK `{text}`"))
                            })?
                            .parse()?;
                        match words.next() {
                            // multi-ack statuses keep negotiation open.
                            Some("continue" | "common" | "ready") => result.common.push(id),
                            _ => {
                                result.common.push(id);
                                negotiation_done = true;
                            }
                        }
                    } else if text == "NAK" {
                        negotiation_done = true;
                    } else if let Some(rest) = text.strip_prefix("ERR ") {
                        return Err(GitError::ProtocolError(format!("server: {rest}")));
                    } else {
                        return Err(GitError::ProtocolError(format!(
                            "unexpected upload-pack line `{text}`"
                        )));
                    }
                }
            }
        }

        if result.pack.is_empty() {
            return Err(GitError::ProtocolError(
                "upload-pack response carried no pack data".to_string(),
            ));
        }
        Ok(result)
    }

    /// Push: one pkt-line per ref update with capabilities on the first,
    /// a flush, the inline pack, then the status report.
    pub async fn send_pack(
        &self,
        discovery: &RefDiscovery,
        commands: &[RefUpdateCommand],
        pack: Vec<u8>,
    ) -> Result<PushReport, GitError> {
        if commands.is_empty() {
            return Err(GitError::InvalidArgument("nothing to push".to_string()));
        }

        let caps = &discovery.capabilities;
        let enabled_tail = {
            let mut words: Vec<String> =
                caps.enable_for_push().iter().map(|c| c.to_string()).collect();
            words.push(AGENT.to_string());
            words.join(" ")
        };

        let mut request = BytesMut::new();
        for (i, command) in commands.iter().enumerate() {
            let line = format!("{} {} {}", command.old, command.new, command.name);
            if i == 0 {
                write_pkt_line(
                    &mut request,
                    format!("{line}\0{enabled_tail}\n").as_bytes(),
                );
            } else {
                write_pkt_line_str(&mut request, &format!("{line}\n"));
            }
        }
        write_flush(&mut request);
        request.extend_from_slice(&pack);

        let url = format!("{}/git-receive-pack", self.base_url);
        let headers = vec![
            (
                "Content-Type".to_string(),
                "application/x-git-receive-pack-request".to_string(),
            ),
            (
                "Accept".to_string(),
                "application/x-git-receive-pack-result".to_string(),
            ),
        ];
        let response = self
            .transport
            .send("POST", &url, &headers, Some(request.freeze()))
            .await?;
        let body = response.collect_body().await?;
        self.parse_status_report(body)
    }

    /// Parse `unpack …` plus per-ref `ok`/`ng` lines, unwrapping one
    /// level of side-band framing if the server used it.
    fn parse_status_report(&self, mut body: Bytes) -> Result<PushReport, GitError> {
        // Peek: a channel-1 first byte means the report is band-wrapped.
        if body.len() > 4 && SideBand::from_byte(body[4]) == Some(SideBand::PackData) {
            let mut inner = BytesMut::new();
            loop {
                match read_pkt_line(&mut body)? {
                    None | Some(PktLine::Flush) => break,
                    Some(PktLine::Delim | PktLine::ResponseEnd) => continue,
                    Some(PktLine::Data(payload)) => match SideBand::from_byte(payload[0]) {
                        Some(SideBand::PackData) => inner.extend_from_slice(&payload[1..]),
                        Some(SideBand::Progress) => {}
                        Some(SideBand::Fatal) | None => {
                            return Err(GitError::ProtocolError(format!(
                                "server: {}",
                                String::from_utf8_lossy(&payload[1..]).trim_end()
                            )));
                        }
                    },
                }
            }
            body = inner.freeze();
        }

        let mut report = PushReport::default();
        let mut saw_unpack = false;
        loop {
            match read_pkt_line(&mut body)? {
                None | Some(PktLine::Flush) => break,
                Some(PktLine::Delim | PktLine::ResponseEnd) => continue,
                Some(PktLine::Data(payload)) => {
                    let text = line_text(&payload)?;
                    if let Some(rest) = text.strip_prefix("unpack ") {
                        saw_unpack = true;
                        if rest == "ok" {
                            report.unpack_ok = true;
                        } else {
                            report.unpack_error = Some(rest.to_string());
                        }
                    } else if let Some(rest) = text.strip_prefix("ok ") {
                        report.ref_results.push((rest.to_string(), Ok(())));
                    } else if let Some(rest) = text.strip_prefix("ng ") {
                        let (name, reason) = rest.split_once(' ').unwrap_or((rest, "unknown"));
                        report
                            .ref_results
                            .push((name.to_string(), Err(reason.to_string())));
                    } else {
                        return Err(GitError::ProtocolError(format!(
                            "unexpected status line `{text}`"
                        )));
                    }
                }
            }
        }

        if !saw_unpack {
            return Err(GitError::ProtocolError(
                "receive-pack response carried no status report".to_string(),
            ));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::protocol::http::{
        AuthScheme, AuthedTransport, HttpRequest, HttpResponse, HttpTransport, body_from_bytes,
    };

    struct CannedServer {
        content_type: &'static str,
        body: Vec<u8>,
    }

    #[async_trait]
    impl HttpTransport for CannedServer {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, GitError> {
            Ok(HttpResponse {
                status: 200,
                headers: vec![("Content-Type".to_string(), self.content_type.to_string())],
                body: body_from_bytes(Bytes::from(self.body.clone())),
            })
        }
    }

    fn authed(server: CannedServer) -> AuthedTransport {
        AuthedTransport::new(
            Arc::new(server),
            AuthScheme::None,
            None,
            None,
            CancellationToken::new(),
        )
    }

    fn advertisement() -> Vec<u8> {
        let mut body = BytesMut::new();
        write_pkt_line_str(&mut body, "# service=git-upload-pack\n");
        write_flush(&mut body);
        write_pkt_line(
            &mut body,
            b"1111111111111111111111111111111111111111 HEAD\0multi_ack multi_ack_detailed side-band-64k ofs-delta thin-pack shallow agent=mock/1\n",
        );
        write_pkt_line_str(
            &mut body,
            "1111111111111111111111111111111111111111 refs/heads/main\n",
        );
        write_pkt_line_str(
            &mut body,
            "2222222222222222222222222222222222222222 refs/tags/v1\n",
        );
        write_pkt_line_str(
            &mut body,
            "3333333333333333333333333333333333333333 refs/tags/v1^{}\n",
        );
        write_flush(&mut body);
        body.to_vec()
    }

    /// Discovery validates the banner, collects refs, parses the
    /// capability tail, and drops peeled rows.
    #[tokio::test]
    async fn discovery_parses_advertisement() {
        let transport = authed(CannedServer {
            content_type: "application/x-git-upload-pack-advertisement",
            body: advertisement(),
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);
        let discovery = client.discover(ServiceType::UploadPack).await.unwrap();

        assert_eq!(discovery.refs.len(), 3);
        assert!(discovery.find("refs/heads/main").is_some());
        assert!(discovery.find("refs/tags/v1^{}").is_none());
        assert!(discovery.capabilities.multi_ack_detailed);
        assert!(discovery.capabilities.side_band_64k);
        assert_eq!(discovery.capabilities.agent.as_deref(), Some("mock/1"));
    }

    /// A wrong content type is a protocol error, not a parse attempt.
    #[tokio::test]
    async fn discovery_rejects_wrong_content_type() {
        let transport = authed(CannedServer {
            content_type: "text/html",
            body: advertisement(),
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);
        let err = client.discover(ServiceType::UploadPack).await.unwrap_err();
        assert!(matches!(err, GitError::ProtocolError(_)));
    }

    /// Side-band demux separates pack bytes, progress, and shallow
    /// markers.
    #[tokio::test]
    async fn fetch_response_demux() {
        let mut body = BytesMut::new();
        write_pkt_line_str(
            &mut body,
            "shallow 1111111111111111111111111111111111111111\n",
        );
        write_pkt_line_str(&mut body, "NAK\n");
        let mut frame = vec![1u8];
        frame.extend_from_slice(b"PACKDATA");
        write_pkt_line(&mut body, &frame);
        let mut progress = vec![2u8];
        progress.extend_from_slice(b"Counting objects: done\n");
        write_pkt_line(&mut body, &progress);
        let mut more = vec![1u8];
        more.extend_from_slice(b"MORE");
        write_pkt_line(&mut body, &more);
        write_flush(&mut body);

        let transport = authed(CannedServer {
            content_type: "application/x-git-upload-pack-result",
            body: vec![],
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: ProgressSink = Box::new(move |text| {
            sink_seen.lock().unwrap().push(text.to_string());
        });
        let result = client
            .parse_fetch_response(body.freeze(), true, Some(&sink))
            .unwrap();

        assert_eq!(result.pack, b"PACKDATAMORE");
        assert_eq!(result.shallow.len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    /// Without side-band, raw pack bytes follow the final NAK.
    #[tokio::test]
    async fn fetch_response_raw_pack() {
        let mut body = BytesMut::new();
        write_pkt_line_str(&mut body, "NAK\n");
        let mut body = body.to_vec();
        body.extend_from_slice(b"PACK-raw-bytes-follow");

        let transport = authed(CannedServer {
            content_type: "application/x-git-upload-pack-result",
            body: vec![],
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);
        let result = client
            .parse_fetch_response(Bytes::from(body), false, None)
            .unwrap();
        assert_eq!(result.pack, b"PACK-raw-bytes-follow");
    }

    /// Channel 3 aborts the fetch with the server's message.
    #[tokio::test]
    async fn fetch_response_fatal_band() {
        let mut body = BytesMut::new();
        write_pkt_line_str(&mut body, "NAK\n");
        let mut fatal = vec![3u8];
        fatal.extend_from_slice(b"out of memory\n");
        write_pkt_line(&mut body, &fatal);

        let transport = authed(CannedServer {
            content_type: "application/x-git-upload-pack-result",
            body: vec![],
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);
        let err = client
            .parse_fetch_response(body.freeze(), true, None)
            .unwrap_err();
        assert!(err.to_string().contains("out of memory"));
    }

    /// The status report parses unpack and per-ref lines.
    #[tokio::test]
    async fn status_report_parses() {
        let mut body = BytesMut::new();
        write_pkt_line_str(&mut body, "unpack ok\n");
        write_pkt_line_str(&mut body, "ok refs/heads/main\n");
        write_pkt_line_str(&mut body, "ng refs/heads/frozen non-fast-forward\n");
        write_flush(&mut body);

        let transport = authed(CannedServer {
            content_type: "application/x-git-receive-pack-result",
            body: vec![],
        });
        let client = SmartHttpClient::new(&transport, "https://example/repo.git", HashKind::Sha1);
        let report = client.parse_status_report(body.freeze()).unwrap();

        assert!(report.unpack_ok);
        assert!(!report.all_ok());
        assert_eq!(report.ref_results[0], ("refs/heads/main".to_string(), Ok(())));
        assert_eq!(
            report.ref_results[1],
            (
                "refs/heads/frozen".to_string(),
                Err("non-fast-forward".to_string())
            )
        );
    }
}
