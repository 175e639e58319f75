use crate::adapters::poller::{
    async_operation_url, retry_after, AsyncOperation, ErrorResponse, OperationStatus, PollSettings,
    Poller,
};
use crate::domain::model::ArmResource;
use crate::domain::ports::{ResourceManager, TokenCredential};
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;

/// Azure Resource Manager over plain REST.
pub struct ArmClient<C: TokenCredential> {
    base_url: String,
    credential: C,
    client: Client,
    poll: PollSettings,
}

impl<C: TokenCredential> ArmClient<C> {
    pub fn new(base_url: impl Into<String>, credential: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client: Client::new(),
            poll: PollSettings::default(),
        }
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.base_url, path, api_version)
    }

    async fn send(&self, method: Method, url: &str, body: Option<&serde_json::Value>) -> Result<Response> {
        let token = self.credential.get_token().await?;
        tracing::debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&token.token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        tracing::debug!("Response status: {}", response.status());
        Ok(response)
    }

    /// Turns a non-2xx response into `ApiError`, keeping the ARM error code.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => (parsed.error.code, parsed.error.message),
            Err(_) => (
                status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            ),
        };

        Err(ProvisionError::ApiError {
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn parse_resource(response: Response) -> Result<ArmResource> {
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(ArmResource::default());
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET of a status URL while waiting. Throttling, server errors and
    /// transport failures give `Ok(None)` so the caller polls again.
    async fn poll_status(
        &self,
        url: &str,
        poller: &Poller,
        delay: &mut Option<Duration>,
    ) -> Result<Option<Response>> {
        let result = match self.send(Method::GET, url, None).await {
            Ok(response) => {
                let headers_delay = retry_after(response.headers());
                Self::check(response).await.map_err(|e| (e, headers_delay))
            }
            Err(e) => Err((e, None)),
        };

        match result {
            Ok(response) => Ok(Some(response)),
            Err((e, headers_delay)) if e.is_transient() => {
                tracing::warn!("⚠️ Status check for {} failed, retrying: {}", poller.resource(), e);
                *delay = headers_delay;
                Ok(None)
            }
            Err((e, _)) => Err(e),
        }
    }

    async fn wait_for_async_operation(
        &self,
        poller: &mut Poller,
        operation_url: &str,
        mut delay: Option<Duration>,
    ) -> Result<()> {
        loop {
            poller.wait(delay).await?;
            let Some(response) = self.poll_status(operation_url, poller, &mut delay).await? else {
                continue;
            };
            delay = retry_after(response.headers());

            let operation: AsyncOperation = response.json().await?;
            let status = OperationStatus::parse(&operation.status);
            match status {
                OperationStatus::Succeeded => return Ok(()),
                OperationStatus::Failed | OperationStatus::Canceled => {
                    return Err(poller.failed(&status, operation.error))
                }
                _ => tracing::debug!("{} is {}", poller.resource(), status.as_str()),
            }
        }
    }

    async fn wait_for_location(
        &self,
        poller: &mut Poller,
        location_url: &str,
        mut delay: Option<Duration>,
    ) -> Result<()> {
        loop {
            poller.wait(delay).await?;
            let Some(response) = self.poll_status(location_url, poller, &mut delay).await? else {
                continue;
            };
            if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
            delay = retry_after(response.headers());
            tracing::debug!("{} still in progress", poller.resource());
        }
    }

    async fn wait_for_provisioning_state(
        &self,
        poller: &mut Poller,
        path: &str,
        api_version: &str,
    ) -> Result<ArmResource> {
        let url = self.url(path, api_version);
        let mut delay = None;
        loop {
            poller.wait(delay).await?;
            let Some(response) = self.poll_status(&url, poller, &mut delay).await? else {
                continue;
            };
            delay = retry_after(response.headers());

            let current = Self::parse_resource(response).await?;
            let status = current
                .provisioning_state()
                .map(OperationStatus::parse)
                .unwrap_or(OperationStatus::Succeeded);
            match status {
                OperationStatus::Succeeded => return Ok(current),
                OperationStatus::Failed | OperationStatus::Canceled => {
                    return Err(poller.failed(&status, None))
                }
                _ => tracing::debug!("{} is {}", poller.resource(), status.as_str()),
            }
        }
    }
}

/// `virtualNetworks/miVNet` style label for log and error messages.
fn describe(path: &str) -> String {
    let mut segments = path.rsplit('/');
    match (segments.next(), segments.next()) {
        (Some(name), Some(kind)) => format!("{}/{}", kind, name),
        _ => path.to_string(),
    }
}

fn location_url(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl<C: TokenCredential> ResourceManager for ArmClient<C> {
    async fn put(&self, path: &str, api_version: &str, body: serde_json::Value) -> Result<ArmResource> {
        // one deadline for every wait phase of this operation
        let mut poller = Poller::new(describe(path), self.poll);
        let response =
            Self::check(self.send(Method::PUT, &self.url(path, api_version), Some(&body)).await?).await?;

        let status = response.status();
        let delay = retry_after(response.headers());
        let operation_url = async_operation_url(response.headers());
        let location = location_url(&response);
        let created = Self::parse_resource(response).await?;

        if let Some(operation_url) = operation_url {
            self.wait_for_async_operation(&mut poller, &operation_url, delay).await?;
            return self.get(path, api_version).await;
        }

        if status == StatusCode::ACCEPTED {
            if let Some(location) = location {
                self.wait_for_location(&mut poller, &location, delay).await?;
            }
            return self.wait_for_provisioning_state(&mut poller, path, api_version).await;
        }

        match created.provisioning_state().map(OperationStatus::parse) {
            Some(state) if !state.is_terminal() => {
                self.wait_for_provisioning_state(&mut poller, path, api_version).await
            }
            Some(state @ (OperationStatus::Failed | OperationStatus::Canceled)) => {
                Err(poller.failed(&state, None))
            }
            _ => Ok(created),
        }
    }

    async fn get(&self, path: &str, api_version: &str) -> Result<ArmResource> {
        let response =
            Self::check(self.send(Method::GET, &self.url(path, api_version), None).await?).await?;
        Self::parse_resource(response).await
    }

    async fn delete(&self, path: &str, api_version: &str) -> Result<()> {
        let mut poller = Poller::new(describe(path), self.poll);
        let response = self.send(Method::DELETE, &self.url(path, api_version), None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!("{} does not exist, nothing to delete", poller.resource());
            return Ok(());
        }
        let response = Self::check(response).await?;

        let delay = retry_after(response.headers());
        if let Some(operation_url) = async_operation_url(response.headers()) {
            return self.wait_for_async_operation(&mut poller, &operation_url, delay).await;
        }
        if response.status() == StatusCode::ACCEPTED {
            if let Some(location) = location_url(&response) {
                return self.wait_for_location(&mut poller, &location, delay).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticTokenCredential;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    const VNET_PATH: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet";

    fn client(server: &MockServer) -> ArmClient<StaticTokenCredential> {
        ArmClient::new(server.base_url(), StaticTokenCredential::new("test-token")).with_poll_settings(
            PollSettings {
                interval: Duration::from_millis(1),
                timeout: Some(Duration::from_secs(5)),
            },
        )
    }

    #[test]
    fn test_describe_uses_last_segments() {
        assert_eq!(describe(VNET_PATH), "virtualNetworks/vnet");
        assert_eq!(describe("/subscriptions/sub/resourcegroups/rg"), "resourcegroups/rg");
    }

    #[tokio::test]
    async fn test_put_sends_bearer_and_api_version() {
        let server = MockServer::start();
        let put_mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/subscriptions/sub/resourcegroups/rg")
                .query_param("api-version", "2021-04-01")
                .header("Authorization", "Bearer test-token")
                .json_body(json!({"location": "eastus", "tags": {}}));
            then.status(201)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "id": "/subscriptions/sub/resourceGroups/rg",
                    "name": "rg",
                    "location": "eastus",
                    "properties": {"provisioningState": "Succeeded"}
                }));
        });

        let result = client(&server)
            .put(
                "/subscriptions/sub/resourcegroups/rg",
                "2021-04-01",
                json!({"location": "eastus", "tags": {}}),
            )
            .await
            .unwrap();

        put_mock.assert();
        assert_eq!(result.name, "rg");
    }

    #[tokio::test]
    async fn test_put_follows_async_operation_header() {
        let server = MockServer::start();
        let operation_url = server.url("/operations/op-1");

        let put_mock = server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(201)
                .header("Content-Type", "application/json")
                .header("Azure-AsyncOperation", operation_url.as_str())
                .json_body(json!({
                    "id": VNET_PATH,
                    "name": "vnet",
                    "properties": {"provisioningState": "Updating"}
                }));
        });
        let operation_mock = server.mock(|when, then| {
            when.method(GET).path("/operations/op-1");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"status": "Succeeded"}));
        });
        let get_mock = server.mock(|when, then| {
            when.method(GET).path(VNET_PATH).query_param("api-version", "2023-09-01");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "id": VNET_PATH,
                    "name": "vnet",
                    "properties": {"provisioningState": "Succeeded"}
                }));
        });

        let result = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({"location": "eastus"}))
            .await
            .unwrap();

        put_mock.assert();
        operation_mock.assert();
        get_mock.assert();
        assert_eq!(result.provisioning_state(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn test_put_reports_failed_async_operation() {
        let server = MockServer::start();
        let operation_url = server.url("/operations/op-2");

        server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(201)
                .header("Azure-AsyncOperation", operation_url.as_str())
                .json_body(json!({"id": VNET_PATH, "name": "vnet"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/operations/op-2");
            then.status(200).json_body(json!({
                "status": "Failed",
                "error": {"code": "NetcfgInvalidSubnet", "message": "Subnet is not valid"}
            }));
        });

        let err = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({}))
            .await
            .unwrap_err();

        match err {
            ProvisionError::OperationFailed {
                resource,
                status,
                message,
            } => {
                assert_eq!(resource, "virtualNetworks/vnet");
                assert_eq!(status, "Failed");
                assert!(message.contains("NetcfgInvalidSubnet"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_polls_provisioning_state_without_headers() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(201).json_body(json!({
                "id": VNET_PATH,
                "name": "vnet",
                "properties": {"provisioningState": "Creating"}
            }));
        });
        let get_mock = server.mock(|when, then| {
            when.method(GET).path(VNET_PATH);
            then.status(200).json_body(json!({
                "id": VNET_PATH,
                "name": "vnet",
                "properties": {"provisioningState": "Succeeded"}
            }));
        });

        let result = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({}))
            .await
            .unwrap();

        get_mock.assert_hits(1);
        assert_eq!(result.provisioning_state(), Some("Succeeded"));
    }

    #[tokio::test]
    async fn test_put_keeps_polling_after_transient_failure() {
        let server = MockServer::start_async().await;
        let operation_url = server.url("/operations/op-3");

        server
            .mock_async(|when, then| {
                when.method(PUT).path(VNET_PATH);
                then.status(201)
                    .header("Azure-AsyncOperation", operation_url.as_str())
                    .json_body(json!({"id": VNET_PATH, "name": "vnet"}));
            })
            .await;
        let unavailable = server
            .mock_async(|when, then| {
                when.method(GET).path("/operations/op-3");
                then.status(503).body("busy");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(VNET_PATH);
                then.status(200).json_body(json!({
                    "id": VNET_PATH,
                    "name": "vnet",
                    "properties": {"provisioningState": "Succeeded"}
                }));
            })
            .await;

        let client = ArmClient::new(server.base_url(), StaticTokenCredential::new("test-token"))
            .with_poll_settings(PollSettings {
                interval: Duration::from_millis(50),
                timeout: Some(Duration::from_secs(5)),
            });

        // swap the 503 for a success once the first status check has failed
        let recover = async {
            while unavailable.hits_async().await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            unavailable.delete_async().await;
            server
                .mock_async(|when, then| {
                    when.method(GET).path("/operations/op-3");
                    then.status(200)
                        .header("Content-Type", "application/json")
                        .json_body(json!({"status": "Succeeded"}));
                })
                .await
        };

        let (result, succeeded) =
            tokio::join!(client.put(VNET_PATH, "2023-09-01", json!({})), recover);

        let resource = result.unwrap();
        assert_eq!(resource.provisioning_state(), Some("Succeeded"));
        succeeded.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_follows_location_then_reads_resource() {
        let server = MockServer::start();
        let location = server.url("/operationresults/put-1");

        let put_mock = server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(202)
                .header("Location", location.as_str())
                .header("Retry-After", "0");
        });
        let location_mock = server.mock(|when, then| {
            when.method(GET).path("/operationresults/put-1");
            then.status(200);
        });
        let get_mock = server.mock(|when, then| {
            when.method(GET).path(VNET_PATH).query_param("api-version", "2023-09-01");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "id": VNET_PATH,
                    "name": "vnet",
                    "properties": {"provisioningState": "Succeeded"}
                }));
        });

        let result = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({"location": "eastus"}))
            .await
            .unwrap();

        put_mock.assert();
        location_mock.assert();
        get_mock.assert();
        assert_eq!(result.id, VNET_PATH);
    }

    #[tokio::test]
    async fn test_put_with_canceled_state_in_body_fails() {
        let server = MockServer::start();
        let put_mock = server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(200).json_body(json!({
                "id": VNET_PATH,
                "name": "vnet",
                "properties": {"provisioningState": "Canceled"}
            }));
        });
        let get_mock = server.mock(|when, then| {
            when.method(GET).path(VNET_PATH);
            then.status(200);
        });

        let err = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({}))
            .await
            .unwrap_err();

        put_mock.assert();
        get_mock.assert_hits(0);
        match err {
            ProvisionError::OperationFailed { resource, status, .. } => {
                assert_eq!(resource, "virtualNetworks/vnet");
                assert_eq!(status, "Canceled");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_put_times_out_while_still_creating() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(201).json_body(json!({
                "id": VNET_PATH,
                "name": "vnet",
                "properties": {"provisioningState": "Creating"}
            }));
        });
        let get_mock = server.mock(|when, then| {
            when.method(GET).path(VNET_PATH);
            then.status(200).json_body(json!({
                "id": VNET_PATH,
                "name": "vnet",
                "properties": {"provisioningState": "Creating"}
            }));
        });

        let client = ArmClient::new(server.base_url(), StaticTokenCredential::new("test-token"))
            .with_poll_settings(PollSettings {
                interval: Duration::from_millis(10),
                timeout: Some(Duration::from_millis(100)),
            });

        let started = std::time::Instant::now();
        let err = client.put(VNET_PATH, "2023-09-01", json!({})).await.unwrap_err();

        assert!(matches!(err, ProvisionError::TimeoutError { ref resource, .. } if resource == "virtualNetworks/vnet"));
        assert!(get_mock.hits() >= 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_api_error_keeps_arm_code() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path(VNET_PATH);
            then.status(400)
                .header("Content-Type", "application/json")
                .json_body(json!({
                    "error": {
                        "code": "InvalidAddressPrefixFormat",
                        "message": "Address prefix 10.0.0.0/99 has an invalid format."
                    }
                }));
        });

        let err = client(&server)
            .put(VNET_PATH, "2023-09-01", json!({}))
            .await
            .unwrap_err();

        match err {
            ProvisionError::ApiError { status, code, .. } => {
                assert_eq!(status, 400);
                assert_eq!(code, "InvalidAddressPrefixFormat");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delete_follows_location_until_done() {
        let server = MockServer::start();
        let location = server.url("/operationresults/del-1");

        let delete_mock = server.mock(|when, then| {
            when.method(DELETE).path("/subscriptions/sub/resourcegroups/rg");
            then.status(202).header("Location", location.as_str());
        });
        let location_mock = server.mock(|when, then| {
            when.method(GET).path("/operationresults/del-1");
            then.status(200);
        });

        client(&server)
            .delete("/subscriptions/sub/resourcegroups/rg", "2021-04-01")
            .await
            .unwrap();

        delete_mock.assert();
        location_mock.assert();
    }

    #[tokio::test]
    async fn test_delete_missing_resource_is_ok() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/subscriptions/sub/resourcegroups/gone");
            then.status(404).json_body(json!({
                "error": {"code": "ResourceGroupNotFound", "message": "not found"}
            }));
        });

        let result = client(&server)
            .delete("/subscriptions/sub/resourcegroups/gone", "2021-04-01")
            .await;

        assert!(result.is_ok());
    }
}
