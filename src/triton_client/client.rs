use std::time::Duration;
use anyhow::{Context, Error};
use tonic::transport::{Channel, Endpoint};
use tracing::debug;
use crate::config::config::TritonConfig;
use crate::triton_client::client::triton::grpc_inference_service_client::GrpcInferenceServiceClient;
use crate::triton_client::client::triton::{ModelConfigRequest, ModelConfigResponse, ModelInferRequest,
                                           ModelInferResponse, ModelReadyRequest, ServerLiveRequest};

pub mod triton {
    tonic::include_proto!("inference");
}

/// Thin wrapper over the generated Triton gRPC client.
#[derive(Debug, Clone)]
pub struct TritonInferenceClient {
    client: GrpcInferenceServiceClient<Channel>,
}

impl TritonInferenceClient {
    /// connect opens a channel to the Triton gRPC endpoint.
    pub async fn connect(config: &TritonConfig) -> Result<Self, Error> {
        let endpoint = Endpoint::from_shared(config.url.clone())
            .with_context(|| format!("invalid triton url {}", config.url))?
            .timeout(Duration::from_secs(config.timeout.max(1) as u64));
        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("cannot connect to triton at {}", config.url))?;
        debug!(url = %config.url, "connected to triton");
        Ok(TritonInferenceClient {
            client: GrpcInferenceServiceClient::new(channel),
        })
    }

    pub async fn server_live(&self) -> Result<bool, Error> {
        let response = self.client.clone().server_live(ServerLiveRequest {}).await?;
        Ok(response.into_inner().live)
    }

    pub async fn model_ready(&self, model_name: &str, model_version: &str) -> Result<bool, Error> {
        let request = ModelReadyRequest {
            name: model_name.to_string(),
            version: model_version.to_string(),
        };
        let response = self.client.clone().model_ready(request).await?;
        Ok(response.into_inner().ready)
    }

    pub async fn model_config(&self, request: ModelConfigRequest) -> Result<ModelConfigResponse, Error> {
        let response = self.client.clone().model_config(request).await?;
        Ok(response.into_inner())
    }

    pub async fn model_infer(&self, request: ModelInferRequest) -> Result<ModelInferResponse, Error> {
        let response = self.client.clone().model_infer(request).await?;
        Ok(response.into_inner())
    }
}
