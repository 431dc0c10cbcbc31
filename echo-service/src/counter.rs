use crate::pb::common::Parity;
use crate::pb::counter::counter_server::Counter;
use crate::pb::counter::{CountRequest, CountResponse};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};

pub struct CounterImpl;

fn response(value: i32) -> CountResponse {
    let parity = if value % 2 == 0 {
        Parity::Even
    } else {
        Parity::Odd
    };

    CountResponse {
        value,
        parity: parity as i32,
    }
}

#[tonic::async_trait]
impl Counter for CounterImpl {
    type CountUpStream = ReceiverStream<Result<CountResponse, Status>>;
    type EndlessStream = ReceiverStream<Result<CountResponse, Status>>;

    async fn check(
        &self,
        request: Request<CountRequest>,
    ) -> Result<Response<CountResponse>, Status> {
        let count = request.into_inner().count;
        if count < 0 {
            return Err(Status::invalid_argument("count must not be negative"));
        }
        Ok(Response::new(response(count)))
    }

    async fn count_up(
        &self,
        request: Request<CountRequest>,
    ) -> Result<Response<Self::CountUpStream>, Status> {
        let req = request.into_inner();
        let (tx, rx) = mpsc::channel(4);

        tokio::spawn(async move {
            for value in 1..=req.count {
                if tx.send(Ok(response(value))).await.is_err() {
                    return;
                }
            }
            if req.fail_at_end {
                tx.send(Err(Status::aborted("counter gave up")))
                    .await
                    .ok();
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn endless(
        &self,
        request: Request<CountRequest>,
    ) -> Result<Response<Self::EndlessStream>, Status> {
        let interval_ms = request.into_inner().interval_ms.max(1);
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms as u64));
            let mut value = 0;
            loop {
                ticker.tick().await;
                value += 1;
                // The client hung up.
                if tx.send(Ok(response(value))).await.is_err() {
                    break;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn collect(
        &self,
        _request: Request<Streaming<CountRequest>>,
    ) -> Result<Response<CountResponse>, Status> {
        Err(Status::unimplemented("client streaming is not served"))
    }
}
