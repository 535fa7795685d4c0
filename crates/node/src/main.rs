//! Obscuro host binary

use alloy_network::EthereumWallet;
use alloy_provider::{Provider, ProviderBuilder};
use clap::Parser;
use obscuro_db::HeaderStore;
use obscuro_node::{
    start_rpc_server, ExitStatus, NodeComponents, ObscuroNode, ObscuroNodeArgs, ObscuroRpc,
};
use obscuro_providers::{AlloyL1Client, RpcEnclaveClient};
use obscuro_wire::{PeerApiHandler, RpcPeerTransport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    init_tracing_subscriber();

    let status = match run(ObscuroNodeArgs::parse()).await {
        Ok(status) => status,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitStatus::Fatal
        }
    };
    std::process::exit(status.code());
}

async fn run(args: ObscuroNodeArgs) -> eyre::Result<ExitStatus> {
    args.validate().map_err(|err| eyre::eyre!(err))?;
    tracing::info!(target: "obscuro::node", chain_id = args.chain_id, sequencer = args.sequencer_args.enabled, "Launching node");

    let config = args.node_config();
    let db = obscuro_db::open(&args.database_args.url()).await?;
    let store = HeaderStore::new(Arc::new(db));

    let url = args.l1_args.url.clone().ok_or_else(|| eyre::eyre!("missing L1 URL"))?;
    let provider = match args.sequencer_args.signer().map_err(|err| eyre::eyre!(err))? {
        Some(signer) => {
            ProviderBuilder::new().wallet(EthereumWallet::from(signer)).connect_http(url).erased()
        }
        None => ProviderBuilder::new().connect_http(url).erased(),
    };
    let l1 = Arc::new(AlloyL1Client::new(provider));

    let (enclave, enclave_events) = RpcEnclaveClient::connect(&args.enclave_args.url).await?;
    let (peer, inbound) = PeerApiHandler::new();
    let transport = RpcPeerTransport::new(config.sync.local.clone());

    let cancellation = CancellationToken::new();
    let components =
        NodeComponents { l1, enclave: Arc::new(enclave), enclave_events, transport, inbound };
    let node = ObscuroNode::launch(config, store.clone(), components, cancellation.clone()).await?;
    let (_, server) =
        start_rpc_server(args.rpc_args.addr, ObscuroRpc::new(node.handle.clone(), store), peer)
            .await?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "obscuro::node", "Received shutdown signal");
            cancellation.cancel();
        }
    });

    let status = node.wait().await;
    let _ = server.stop();
    Ok(status)
}

/// Initialize the tracing subscriber, filtered by `RUST_LOG` and defaulting to `info`.
fn init_tracing_subscriber() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_ansi(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}
