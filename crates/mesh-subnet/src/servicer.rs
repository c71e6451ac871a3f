// crates/mesh-subnet/src/servicer.rs
//
// CalculatorServicer: answers `calculator/calculate` calls.

use async_trait::async_trait;
use mesh_core::{CalculationRequest, CalculationResponse, MeshError, PeerInfo};
use mesh_rpc::{dispatch_handler, CallContext, Servicer};
use tracing::{error, info};

use crate::calculator::{Calculator, Evaluator};

/// Overlay method name of the calculate call.
pub const CALCULATE_METHOD: &str = "calculator/calculate";

/// Error returned by nodes that have no evaluator.
pub const CLIENT_MODE_ERROR: &str = "Node is in client mode - cannot perform calculations";

/// Servicer behind the calculator protocol.
///
/// Server-mode instances get their evaluator during worker setup; client-mode
/// instances never do and answer every request with [`CLIENT_MODE_ERROR`].
pub struct CalculatorServicer {
    client_mode: bool,
    local: PeerInfo,
    evaluator: Option<Box<dyn Evaluator>>,
}

impl std::fmt::Debug for CalculatorServicer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalculatorServicer")
            .field("client_mode", &self.client_mode)
            .field("local", &self.local)
            .field("has_evaluator", &self.evaluator.is_some())
            .finish()
    }
}

impl CalculatorServicer {
    pub fn new(client_mode: bool) -> Self {
        Self {
            client_mode,
            local: PeerInfo::new(""),
            evaluator: None,
        }
    }

    /// Use `evaluator` instead of the default [`Calculator`].
    /// Ignored in client mode.
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        if !self.client_mode {
            self.evaluator = Some(evaluator);
        }
        self
    }

    /// Evaluate one request. Never fails: every outcome is a response.
    pub fn handle_calculate(&mut self, request: CalculationRequest) -> CalculationResponse {
        let CalculationRequest {
            expression,
            request_id,
            ..
        } = request;
        info!("Received calculation: {}", expression);

        let Some(evaluator) = self.evaluator.as_mut() else {
            return CalculationResponse::failure(
                self.local.clone(),
                expression,
                CLIENT_MODE_ERROR,
                request_id,
            );
        };

        match evaluator.evaluate(&expression) {
            Ok(result) => {
                info!("{} = {}", expression, result);
                CalculationResponse::success(self.local.clone(), expression, result, request_id)
            }
            Err(err) => {
                error!("{} failed: {}", expression, err);
                CalculationResponse::failure(self.local.clone(), expression, err, request_id)
            }
        }
    }
}

#[async_trait(?Send)]
impl Servicer for CalculatorServicer {
    fn name(&self) -> &str {
        "calculator"
    }

    fn methods(&self) -> Vec<String> {
        vec![CALCULATE_METHOD.to_string()]
    }

    async fn setup(&mut self, local: &PeerInfo) -> Result<(), MeshError> {
        self.local = local.clone();
        if !self.client_mode && self.evaluator.is_none() {
            self.evaluator = Some(Box::new(Calculator::new()));
            info!("Calculator ready");
        }
        Ok(())
    }

    async fn handle(
        &mut self,
        method: &str,
        params: serde_json::Value,
        _ctx: &CallContext,
    ) -> Result<serde_json::Value, String> {
        match method {
            CALCULATE_METHOD => {
                dispatch_handler(params, |request: CalculationRequest| {
                    let response = self.handle_calculate(request);
                    async move { Ok::<_, String>(response) }
                })
                .await
            }
            _ => Err(format!("Unknown method: {}", method)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn server() -> CalculatorServicer {
        let mut servicer = CalculatorServicer::new(false);
        servicer.setup(&PeerInfo::new("server")).await.unwrap();
        servicer
    }

    fn request(expr: &str) -> CalculationRequest {
        CalculationRequest {
            requester: PeerInfo::new("client"),
            expression: expr.to_string(),
            request_id: "calc_42".to_string(),
        }
    }

    #[tokio::test]
    async fn server_mode_evaluates() {
        let mut servicer = server().await;
        let resp = servicer.handle_calculate(request("4 * 3"));
        assert!(resp.success);
        assert_eq!(resp.result, 12.0);
        assert_eq!(resp.error, "");
        assert_eq!(resp.responder, PeerInfo::new("server"));
        assert_eq!(resp.request_id, "calc_42");
    }

    #[tokio::test]
    async fn evaluator_errors_become_failed_responses() {
        let mut servicer = server().await;
        let resp = servicer.handle_calculate(request("10 / 0"));
        assert!(!resp.success);
        assert_eq!(resp.error, "Division by zero");
        assert_eq!(resp.result, 0.0);

        let resp = servicer.handle_calculate(request("4*x"));
        assert_eq!(resp.error, "Invalid characters in expression");
        assert!(resp.is_consistent());
    }

    #[tokio::test]
    async fn client_mode_refuses_even_valid_expressions() {
        let mut servicer = CalculatorServicer::new(true);
        servicer.setup(&PeerInfo::new("client-node")).await.unwrap();
        for expr in ["4*3", "4*x", ""] {
            let resp = servicer.handle_calculate(request(expr));
            assert!(!resp.success);
            assert_eq!(resp.error, CLIENT_MODE_ERROR);
            assert_eq!(resp.result, 0.0);
            assert_eq!(resp.expression, expr);
            assert_eq!(resp.request_id, "calc_42");
        }
    }

    #[tokio::test]
    async fn custom_evaluator_is_used() {
        struct Always(f64);
        impl Evaluator for Always {
            fn evaluate(&mut self, _expression: &str) -> Result<f64, String> {
                Ok(self.0)
            }
        }

        let mut servicer = CalculatorServicer::new(false).with_evaluator(Box::new(Always(7.0)));
        servicer.setup(&PeerInfo::new("server")).await.unwrap();
        assert_eq!(servicer.handle_calculate(request("1+1")).result, 7.0);
    }

    #[tokio::test]
    async fn handle_dispatches_by_method() {
        let mut servicer = server().await;
        let ctx = CallContext {
            remote: PeerInfo::new("client"),
            local: PeerInfo::new("server"),
        };
        let params = serde_json::to_value(request("15 + 27")).unwrap();
        let value = servicer
            .handle(CALCULATE_METHOD, params, &ctx)
            .await
            .unwrap();
        let resp: CalculationResponse = serde_json::from_value(value).unwrap();
        assert_eq!(resp.result, 42.0);

        let err = servicer
            .handle("calculator/other", serde_json::Value::Null, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err, "Unknown method: calculator/other");
    }
}
