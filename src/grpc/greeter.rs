use std::sync::Arc;

use rpcstream_lite::{CallHooks, CallScope, TracingHooks};
use tonic::{Request, Response, Status};

use crate::helloworld::greeter_server::Greeter;
use crate::helloworld::{HelloReply, HelloRequest};
use crate::methods;

pub struct GreeterService {
    hooks: Arc<dyn CallHooks>,
}

impl GreeterService {
    pub fn new() -> Self {
        Self {
            hooks: Arc::new(TracingHooks),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn CallHooks>) -> Self {
        self.hooks = hooks;
        self
    }
}

impl Default for GreeterService {
    fn default() -> Self {
        Self::new()
    }
}

#[tonic::async_trait]
impl Greeter for GreeterService {
    async fn say_hello(
        &self,
        request: Request<HelloRequest>,
    ) -> Result<Response<HelloReply>, Status> {
        let scope = CallScope::start(Arc::clone(&self.hooks), methods::SAY_HELLO);
        let reply = HelloReply {
            message: format!("Hello {}", request.into_inner().name),
        };
        scope.finish(Ok(()));
        Ok(Response::new(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_say_hello() {
        let reply = GreeterService::new()
            .say_hello(Request::new(HelloRequest {
                name: "world".into(),
            }))
            .await
            .unwrap();
        assert_eq!(reply.into_inner().message, "Hello world");
    }
}
