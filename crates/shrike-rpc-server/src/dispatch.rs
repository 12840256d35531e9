//! Method registration and dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;
use tracing::debug;

use shrike_json_rpc::RpcError;

use crate::context::CallContext;

/// A registered procedure. Implemented for you by
/// [`MethodRegistry::register`]; implement it directly when a method
/// needs to work on raw params.
#[async_trait]
pub trait Method: Send + Sync {
    async fn call(&self, ctx: CallContext, params: Option<&RawValue>) -> Result<Value, RpcError>;
}

/// The host dispatcher: a map from `"Service.method"` names to handlers.
#[derive(Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Arc<dyn Method>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler under a `"Service.method"` name.
    ///
    /// Absent params decode to `P::default()`, the zero value. Params
    /// that do not fit `P` yield Invalid Params naming the target type.
    /// A later registration under the same name replaces the earlier one.
    pub fn register<P, R, F, Fut>(&mut self, name: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + Default + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(CallContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RpcError>> + Send,
    {
        self.methods.insert(
            name.into(),
            Arc::new(FnMethod {
                handler,
                _marker: PhantomData,
            }),
        );
    }

    /// Register a raw [`Method`] implementation.
    pub fn register_method(&mut self, name: impl Into<String>, method: impl Method + 'static) {
        self.methods.insert(name.into(), Arc::new(method));
    }

    pub fn registered_methods(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).collect()
    }

    /// Look up and invoke a method.
    pub async fn dispatch(
        &self,
        ctx: CallContext,
        name: &str,
        params: Option<&RawValue>,
    ) -> Result<Value, RpcError> {
        match self.methods.get(name) {
            Some(method) => {
                debug!(method = name, "dispatching");
                method.call(ctx, params).await
            }
            None => Err(self.not_found(name)),
        }
    }

    fn not_found(&self, name: &str) -> RpcError {
        let Some((service, _)) = name.split_once('.') else {
            return RpcError::method_not_found(format!(
                "service/method request ill-formed: {name}"
            ));
        };
        let prefix = format!("{service}.");
        if self.methods.keys().any(|key| key.starts_with(&prefix)) {
            RpcError::method_not_found(format!("can't find method {name}"))
        } else {
            RpcError::method_not_found(format!("can't find service {name}"))
        }
    }
}

struct FnMethod<P, R, F> {
    handler: F,
    _marker: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<P, R, F, Fut> Method for FnMethod<P, R, F>
where
    P: DeserializeOwned + Default + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(CallContext, P) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, RpcError>> + Send,
{
    async fn call(&self, ctx: CallContext, params: Option<&RawValue>) -> Result<Value, RpcError> {
        let params = decode_params::<P>(params)?;
        let reply = (self.handler)(ctx, params).await?;
        serde_json::to_value(reply).map_err(|err| RpcError::internal_error(err.to_string()))
    }
}

fn decode_params<P: DeserializeOwned + Default>(
    params: Option<&RawValue>,
) -> Result<P, RpcError> {
    match params {
        None => Ok(P::default()),
        Some(raw) => serde_json::from_str(raw.get()).map_err(|err| {
            RpcError::invalid_params(format!(
                "cannot decode params into {}: {}",
                std::any::type_name::<P>(),
                err
            ))
        }),
    }
}
