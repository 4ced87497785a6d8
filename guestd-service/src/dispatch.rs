// SPDX-License-Identifier: GPL-3.0-only

//! Request loop
//!
//! Requests are served strictly one at a time: a handler runs to
//! completion on the blocking pool before the next frame is read.

use std::sync::Arc;

use guestd_sys::DaemonContext;
use guestd_types::{Reply, Request};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::error::{Result, ServiceError};
use crate::handlers;
use crate::transport::Transport;

pub struct Dispatcher<S> {
    ctx: Arc<DaemonContext>,
    transport: Transport<S>,
}

impl<S> Dispatcher<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(ctx: Arc<DaemonContext>, transport: Transport<S>) -> Self {
        Self { ctx, transport }
    }

    /// Serve until the host closes the channel.
    ///
    /// Returns an error only when serving cannot continue: a transport
    /// failure, or a handler failure that leaves the daemon unsafe to use.
    pub async fn serve(mut self) -> Result<()> {
        while let Some(frame) = self.transport.read_frame().await? {
            let request = match Request::from_slice(&frame) {
                Ok(request) => request,
                Err(err) => {
                    // Without a serial there is nobody to reply to.
                    warn!("Dropping undecodable request: {err}");
                    continue;
                }
            };

            let reply = self.dispatch(request).await?;
            let payload = reply.to_vec()?;
            self.transport.write_frame(&payload).await?;
        }

        info!("Host closed the channel");
        Ok(())
    }

    async fn dispatch(&self, request: Request) -> Result<Reply> {
        let serial = request.serial;
        let procedure = request.call.name();
        debug!(serial, procedure, "dispatching");

        let ctx = Arc::clone(&self.ctx);
        let call = request.call;
        let result = tokio::task::spawn_blocking(move || handlers::handle(&ctx, call))
            .await
            .map_err(|err| ServiceError::Transport(std::io::Error::other(err)))?;

        match result {
            Ok(value) => Ok(Reply::ok(serial, value)),
            Err(err) if err.is_fatal() => {
                error!(serial, procedure, "{err}");
                Err(err)
            }
            Err(err) => {
                warn!(serial, procedure, "{err}");
                Ok(Reply::error(serial, err.reply_message(procedure)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use guestd_sys::DeviceNameCache;
    use guestd_types::{Call, ReplyValue};
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::transport::DEFAULT_MAX_MESSAGE;

    fn context() -> Arc<DaemonContext> {
        Arc::new(
            DaemonContext::builder()
                .devices(DeviceNameCache::from_devices(vec!["/dev/vda".into()]))
                .build()
                .unwrap(),
        )
    }

    async fn call(host: &mut Transport<tokio::io::DuplexStream>, serial: u32, call: Call) -> Reply {
        let request = Request { serial, call };
        host.write_frame(&request.to_vec().unwrap()).await.unwrap();
        let frame = host.read_frame().await.unwrap().expect("reply frame");
        Reply::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn replies_carry_the_request_serial() {
        let (host, guest) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(
            Dispatcher::new(context(), Transport::new(guest, DEFAULT_MAX_MESSAGE)).serve(),
        );
        let mut host = Transport::new(host, DEFAULT_MAX_MESSAGE);

        let reply = call(&mut host, 11, Call::Ping).await;
        assert_eq!(reply, Reply::ok(11, ReplyValue::Unit));

        let reply = call(&mut host, 12, Call::ListDevices).await;
        assert_eq!(
            reply,
            Reply::ok(12, ReplyValue::Strings(vec!["/dev/sda".into()]))
        );

        drop(host);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn handler_errors_keep_the_loop_running() {
        let (host, guest) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(
            Dispatcher::new(context(), Transport::new(guest, DEFAULT_MAX_MESSAGE)).serve(),
        );
        let mut host = Transport::new(host, DEFAULT_MAX_MESSAGE);

        let reply = call(
            &mut host,
            1,
            Call::MountableSubvolume {
                mountable: "LABEL=root".into(),
            },
        )
        .await;
        let message = reply.result.unwrap_err();
        assert!(message.starts_with("mountable_subvolume: LABEL=root"), "{message}");

        let reply = call(&mut host, 2, Call::Ping).await;
        assert_eq!(reply.result, Ok(ReplyValue::Unit));

        drop(host);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let (mut raw, guest) = tokio::io::duplex(64 * 1024);
        let server = tokio::spawn(
            Dispatcher::new(context(), Transport::new(guest, DEFAULT_MAX_MESSAGE)).serve(),
        );

        raw.write_all(&3u32.to_be_bytes()).await.unwrap();
        raw.write_all(b"xyz").await.unwrap();

        let mut host = Transport::new(raw, DEFAULT_MAX_MESSAGE);
        let reply = call(&mut host, 5, Call::Ping).await;
        assert_eq!(reply.serial, 5);

        drop(host);
        server.await.unwrap().unwrap();
    }
}
