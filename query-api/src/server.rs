// Copyright (c) James Kassemi, SC, US. All rights reserved.
use std::{future::Future, sync::Arc};

use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};

use crate::QuerySurface;

/// Accepts connections until `shutdown` resolves; each connection runs on its own task.
pub async fn serve(
    surface: Arc<QuerySurface>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("query api listening on http://{addr}"),
        Err(err) => warn!("query api listening on unknown address: {err}"),
    }
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("query api shutting down");
                break;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let surface = Arc::clone(&surface);
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, surface).await {
                                warn!("query api connection error: {err}");
                            }
                        });
                    }
                    Err(err) => error!("query api accept error: {err}"),
                }
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, surface: Arc<QuerySurface>) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let surface = Arc::clone(&surface);
        async move {
            let response = surface.respond(req.method(), req.uri().path()).await;
            Ok::<_, hyper::Error>(response)
        }
    });
    http1::Builder::new().serve_connection(io, service).await
}
