use crate::pb::greet::greeter_server::Greeter;
use crate::pb::greet::{HelloReq, HelloResp};
use tonic::{Request, Response, Status};

pub struct GreeterImpl;

#[tonic::async_trait]
impl Greeter for GreeterImpl {
    async fn hello(&self, request: Request<HelloReq>) -> Result<Response<HelloResp>, Status> {
        Ok(Response::new(HelloResp {
            greeting: format!("hello {}", request.into_inner().name),
        }))
    }
}
