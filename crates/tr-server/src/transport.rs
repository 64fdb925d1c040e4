//! Newline-delimited JSON transport for the environment service.
//!
//! Every request is one line, `{"metadata": {...}, "call": {"op": ..., ...}}`.
//! Unary calls are answered with one `{"ok": ...}` or
//! `{"error": {"code", "message"}}` line. `CreateSpectator` and
//! `ConnectRemoteModel` are acknowledged with an `ok` line, after which the
//! connection carries one event per line until the peer hangs up.

use std::collections::HashMap;
use std::future::Future;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tr_gateway::api::{
    ConnectRemoteModelRequest, CreateEntityRequest, EntityIdRequest, ExecuteAgentActionRequest,
    RegionRequest, SpectatorRequest, SubscriptionRequest,
};
use tr_gateway::{EnvironmentService, EventSink, GatewayError, GatewayResult, Metadata, StatusCode};

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    metadata: HashMap<String, String>,
    call: Call,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op")]
enum Call {
    CreateEntity(CreateEntityRequest),
    GetEntity(EntityIdRequest),
    DeleteEntity(EntityIdRequest),
    GetEntitiesInRegion(RegionRequest),
    ExecuteAgentAction(ExecuteAgentActionRequest),
    GetAgentObservation(EntityIdRequest),
    ResetWorld,
    StepWorld,
    CreateSpectator(SpectatorRequest),
    SubscribeSpectatorToRegion(SubscriptionRequest),
    UnsubscribeSpectatorFromRegion(SubscriptionRequest),
    ConnectRemoteModel(ConnectRemoteModelRequest),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: StatusCode,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum Reply {
    Ok(Value),
    Error(ErrorBody),
}

impl Reply {
    fn from_result(result: GatewayResult<Value>) -> Self {
        match result {
            Ok(value) => Reply::Ok(value),
            Err(err) => Reply::failure(&err),
        }
    }

    fn failure(err: &GatewayError) -> Self {
        Reply::Error(ErrorBody {
            code: err.status(),
            message: err.to_string(),
        })
    }
}

/// Writes one JSON document per line.
#[derive(Debug)]
pub struct JsonLines<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> JsonLines<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `value` as one line and flush.
    pub async fn write<T: Serialize + Sync>(&mut self, value: &T) -> io::Result<()> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await
    }
}

impl<W, T> EventSink<T> for JsonLines<W>
where
    W: AsyncWrite + Unpin + Send,
    T: Serialize + Send + Sync,
{
    type Error = io::Error;

    async fn send(&mut self, item: T) -> io::Result<()> {
        self.write(&item).await
    }
}

fn to_json<T: Serialize>(value: T) -> GatewayResult<Value> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}

async fn dispatch(service: &EnvironmentService, md: &Metadata, call: Call) -> GatewayResult<Value> {
    match call {
        Call::CreateEntity(req) => to_json(service.create_entity(md, req).await?),
        Call::GetEntity(req) => to_json(service.get_entity(md, req).await?),
        Call::DeleteEntity(req) => to_json(service.delete_entity(md, req).await?),
        Call::GetEntitiesInRegion(req) => to_json(service.get_entities_in_region(md, req).await?),
        Call::ExecuteAgentAction(req) => to_json(service.execute_agent_action(md, req).await?),
        Call::GetAgentObservation(req) => to_json(service.get_agent_observation(md, req).await?),
        Call::ResetWorld => to_json(service.reset_world(md).await?),
        Call::StepWorld => to_json(service.step_world(md).await?),
        Call::SubscribeSpectatorToRegion(req) => {
            to_json(service.subscribe_spectator_to_region(md, req).await?)
        }
        Call::UnsubscribeSpectatorFromRegion(req) => {
            to_json(service.unsubscribe_spectator_from_region(md, req).await?)
        }
        Call::CreateSpectator(_) | Call::ConnectRemoteModel(_) => Err(GatewayError::Internal(
            "streaming call dispatched as unary".to_string(),
        )),
    }
}

/// Resolves once the peer closes its side. Lines sent while streaming are
/// ignored.
async fn peer_closed<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) {
    while let Ok(Some(_)) = lines.next_line().await {}
}

/// Serve one connection until the peer hangs up or a stream ends.
pub async fn handle_connection<S>(stream: S, service: EnvironmentService) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut out = JsonLines::new(writer);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                let err = GatewayError::InvalidArgument(format!("malformed request: {e}"));
                out.write(&Reply::failure(&err)).await?;
                continue;
            }
        };
        let md: Metadata = request.metadata.into_iter().collect();

        match request.call {
            Call::CreateSpectator(req) => {
                let stream = match service.create_spectator(&md, req).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        out.write(&Reply::failure(&err)).await?;
                        continue;
                    }
                };
                let ack = serde_json::json!({ "spectatorId": stream.id() });
                if let Err(err) = out.write(&Reply::Ok(ack)).await {
                    stream.close().await;
                    return Err(err);
                }
                let end = stream.pump(&mut out, peer_closed(&mut lines)).await;
                debug!(?end, "spectator connection finished");
                return Ok(());
            }
            Call::ConnectRemoteModel(req) => {
                let stream = match service.connect_remote_model(&md, req).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        out.write(&Reply::failure(&err)).await?;
                        continue;
                    }
                };
                let key = stream.key();
                let ack = serde_json::json!({ "ownerId": key.owner_id, "modelName": key.model_name });
                if let Err(err) = out.write(&Reply::Ok(ack)).await {
                    stream.close().await;
                    return Err(err);
                }
                let end = stream.pump(&mut out, peer_closed(&mut lines)).await;
                debug!(?end, "model connection finished");
                return Ok(());
            }
            call => {
                let reply = Reply::from_result(dispatch(&service, &md, call).await);
                out.write(&reply).await?;
            }
        }
    }
    Ok(())
}

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, service: EnvironmentService, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (socket, peer) = accepted?;
                debug!(%peer, "connection accepted");
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(socket, service).await {
                        warn!(%peer, %err, "connection failed");
                    }
                });
            }
        }
    }
}
