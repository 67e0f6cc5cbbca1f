//! gRPC transport to the GoBGP daemon

use crate::api::{
    AddPathRequest, AddPathResponse, DeletePathRequest, GetBgpRequest, GetBgpResponse, ListPathRequest,
    ListPathResponse,
};
use crate::{AdapterError, Result, TlsClientConfig};
use async_trait::async_trait;
use std::time::Duration;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

/// Raw speaker RPCs, one method per GoBGP call the updater makes
#[async_trait]
pub trait SpeakerApi: Send + Sync {
    async fn get_bgp(&self, request: GetBgpRequest) -> Result<GetBgpResponse>;

    async fn add_path(&self, request: AddPathRequest) -> Result<AddPathResponse>;

    async fn delete_path(&self, request: DeletePathRequest) -> Result<()>;

    /// Drain the ListPath stream into memory
    async fn list_path(&self, request: ListPathRequest) -> Result<Vec<ListPathResponse>>;
}

/// GoBGP client over a tonic channel
pub struct GobgpClient {
    channel: Channel,
    endpoint: String,
}

impl GobgpClient {
    /// Dial the speaker. `endpoint` is `host:port` or a full URI.
    pub async fn connect(
        endpoint: &str,
        tls: Option<&TlsClientConfig>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let uri = if endpoint.contains("://") {
            endpoint.to_string()
        } else if tls.is_some() {
            format!("https://{}", endpoint)
        } else {
            format!("http://{}", endpoint)
        };

        let mut builder = Endpoint::from_shared(uri.clone())
            .map_err(|_| AdapterError::InvalidEndpoint(endpoint.to_string()))?
            .connect_timeout(connect_timeout);
        if let Some(tls) = tls {
            builder = builder.tls_config(tls.to_tonic())?;
        }

        let channel = builder.connect().await?;
        info!("Connected to GoBGP at {}", uri);

        Ok(Self {
            channel,
            endpoint: uri,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn grpc(&self, op: &'static str) -> Result<Grpc<Channel>> {
        let mut grpc = Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| AdapterError::rpc(op, tonic::Status::unavailable(e.to_string())))?;
        Ok(grpc)
    }
}

const GET_BGP: &str = "/apipb.GobgpApi/GetBgp";
const ADD_PATH: &str = "/apipb.GobgpApi/AddPath";
const DELETE_PATH: &str = "/apipb.GobgpApi/DeletePath";
const LIST_PATH: &str = "/apipb.GobgpApi/ListPath";

#[async_trait]
impl SpeakerApi for GobgpClient {
    async fn get_bgp(&self, request: GetBgpRequest) -> Result<GetBgpResponse> {
        let mut grpc = self.grpc("GetBgp").await?;
        let response = grpc
            .unary(tonic::Request::new(request), PathAndQuery::from_static(GET_BGP), ProstCodec::default())
            .await
            .map_err(|s| AdapterError::rpc("GetBgp", s))?;
        Ok(response.into_inner())
    }

    async fn add_path(&self, request: AddPathRequest) -> Result<AddPathResponse> {
        let mut grpc = self.grpc("AddPath").await?;
        let response = grpc
            .unary(tonic::Request::new(request), PathAndQuery::from_static(ADD_PATH), ProstCodec::default())
            .await
            .map_err(|s| AdapterError::rpc("AddPath", s))?;
        Ok(response.into_inner())
    }

    async fn delete_path(&self, request: DeletePathRequest) -> Result<()> {
        let mut grpc = self.grpc("DeletePath").await?;
        grpc.unary::<_, (), _>(tonic::Request::new(request), PathAndQuery::from_static(DELETE_PATH), ProstCodec::default())
            .await
            .map_err(|s| AdapterError::rpc("DeletePath", s))?;
        Ok(())
    }

    async fn list_path(&self, request: ListPathRequest) -> Result<Vec<ListPathResponse>> {
        let mut grpc = self.grpc("ListPath").await?;
        let mut stream = grpc
            .server_streaming(tonic::Request::new(request), PathAndQuery::from_static(LIST_PATH), ProstCodec::default())
            .await
            .map_err(|s| AdapterError::rpc("ListPath", s))?
            .into_inner();

        let mut responses = Vec::new();
        while let Some(response) = stream
            .message()
            .await
            .map_err(|s| AdapterError::rpc("ListPath", s))?
        {
            responses.push(response);
        }
        debug!("ListPath returned {} destinations", responses.len());

        Ok(responses)
    }
}
