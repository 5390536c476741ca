use anp_core::description::PeerInfo;
use anp_core::{BoxError, Method, MethodDefinition, ParamDef, RpcRequest};
use anp_did::{DidDocument, DidIdentity};
use anp_engine::{discover, AnpClient, Context, Runtime};
use anp_server::{shutdown_signal, ServerBuilder};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a did:wba identity: a DID document and a hex private key file.
    IdentityNew {
        /// Hostname the DID document will be served from (no IP literals).
        #[arg(long)]
        hostname: String,

        /// Optional port, encoded as %3A<port> in the DID.
        #[arg(long)]
        port: Option<u16>,

        /// Path segments under the host, e.g. --path user --path alice.
        #[arg(long)]
        path: Vec<String>,

        /// Optional agent-description URL published as a service entry.
        #[arg(long)]
        ad_url: Option<String>,

        /// Use the Ed25519 + X25519 key variant instead of secp256k1.
        #[arg(long)]
        ed25519: bool,

        /// Directory the identity files are written into.
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Validate a DID document file.
    IdentityValidate {
        /// Path to the did.json file.
        #[arg(long, env = "ANP_DID_DOC_PATH")]
        doc: PathBuf,
    },

    /// Make a signed JSON-RPC call to an endpoint.
    Call {
        #[arg(short, long, default_value = "http://127.0.0.1:8800/agent/rpc")]
        endpoint: String,

        /// RPC method name.
        #[arg(short, long)]
        method: String,

        /// RPC params as a JSON object, default {}.
        #[arg(short, long)]
        params: Option<String>,

        /// Path to the caller's DID document.
        #[arg(long, env = "ANP_DID_DOC_PATH")]
        doc: PathBuf,

        /// Path to the caller's hex private key.
        #[arg(long, env = "ANP_PRIVATE_KEY_PATH")]
        key: PathBuf,
    },

    /// Discover an agent from its ad.json and list its callable methods.
    Discover {
        /// URL of the agent description.
        #[arg(short, long)]
        url: String,

        /// Print the methods as an OpenAI tool array.
        #[arg(long)]
        tools: bool,

        /// Optional path to the caller's DID document for authenticated discovery.
        #[arg(long, env = "ANP_DID_DOC_PATH")]
        doc: Option<PathBuf>,

        /// Optional path to the caller's hex private key.
        #[arg(long, env = "ANP_PRIVATE_KEY_PATH")]
        key: Option<PathBuf>,
    },

    /// Run a demo agent exposing one echo method.
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:8800")]
        addr: String,

        #[arg(long, default_value = "Echo Agent")]
        name: String,

        #[arg(long, default_value = "/agent")]
        prefix: String,

        /// Public base URL advertised in the documents.
        #[arg(long, default_value = "http://127.0.0.1:8800")]
        base_url: String,
    },
}

#[derive(Debug, Deserialize)]
struct EchoArgs {
    text: String,
}

struct EchoMethod;

impl Method<Context> for EchoMethod {
    type Args = EchoArgs;
    type Output = Value;

    fn name(&self) -> String {
        "echo".to_string()
    }

    fn definition(&self) -> MethodDefinition {
        MethodDefinition::new("echo", "Returns the input text unchanged.")
            .with_param(ParamDef::required("text", json!({"type": "string"})))
            .with_result(json!({"type": "object"}))
    }

    async fn call(&self, _ctx: Context, args: Self::Args) -> Result<Self::Output, BoxError> {
        Ok(json!({"echo": args.text}))
    }
}

fn load_identity(doc: &PathBuf, key: &PathBuf) -> Result<Arc<DidIdentity>, BoxError> {
    Ok(Arc::new(DidIdentity::from_files(doc, key)?))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv::dotenv().ok();
    structured_logger::Builder::with_level(&structured_logger::get_env_level().to_string()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::IdentityNew {
            hostname,
            port,
            path,
            ad_url,
            ed25519,
            out_dir,
        } => {
            let segments: Vec<&str> = path.iter().map(|s| s.as_str()).collect();
            let identity = if ed25519 {
                DidIdentity::new_wba_ed25519(&hostname, port, &segments, ad_url.as_deref())?
            } else {
                DidIdentity::new_wba(&hostname, port, &segments, ad_url.as_deref())?
            };

            std::fs::create_dir_all(&out_dir)?;
            let doc_path = out_dir.join("did.json");
            std::fs::write(
                &doc_path,
                serde_json::to_string_pretty(&identity.document)?,
            )?;
            for fragment in identity.key_fragments() {
                if let Some(secret) = identity.secret_hex(fragment) {
                    std::fs::write(out_dir.join(format!("{fragment}.hex")), secret)?;
                }
            }
            println!("{}", identity.did);
            println!("document: {}", doc_path.display());
        }

        Commands::IdentityValidate { doc } => {
            let text = std::fs::read_to_string(&doc)?;
            let document: DidDocument = serde_json::from_str(&text)?;
            document.validate()?;
            println!("{} is valid", document.id);
        }

        Commands::Call {
            endpoint,
            method,
            params,
            doc,
            key,
        } => {
            let identity = load_identity(&doc, &key)?;
            let params: Value = match params {
                Some(text) => serde_json::from_str(&text)?,
                None => json!({}),
            };
            let client = AnpClient::new(Some(identity));
            let request = RpcRequest::new(
                json!(uuid::Uuid::new_v4().to_string()),
                method,
                Some(params),
            );
            let response = client
                .post_json(&endpoint, &serde_json::to_value(&request)?)
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Commands::Discover {
            url,
            tools,
            doc,
            key,
        } => {
            let identity = match (&doc, &key) {
                (Some(doc), Some(key)) => Some(load_identity(doc, key)?),
                _ => None,
            };
            let agent = discover(AnpClient::new(identity), &url).await?;
            if tools {
                println!("{}", serde_json::to_string_pretty(&agent.open_ai_tools())?);
            } else {
                println!("{} — {}", agent.name, agent.description);
                for name in agent.method_names() {
                    println!("  {name}");
                }
            }
        }

        Commands::Serve {
            addr,
            name,
            prefix,
            base_url,
        } => {
            let identity = Arc::new(DidIdentity::new_wba("localhost", None, &["agent"], None)?);
            let runtime = Runtime::builder()
                .with_info(PeerInfo {
                    name: name.clone(),
                    did: identity.did.clone(),
                    description: "Demo agent that echoes its input.".to_string(),
                    prefix,
                    version: env!("CARGO_PKG_VERSION").to_string(),
                })
                .with_base_url(base_url)
                .with_identity(identity)
                .register_method(EchoMethod)?
                .build()?;

            let cancel_token = CancellationToken::new();
            let shutdown = shutdown_signal(cancel_token.clone(), Duration::from_secs(3));
            ServerBuilder::new()
                .with_app_name(name)
                .with_addr(addr)
                .with_runtime(runtime)
                .serve(shutdown)
                .await?;
        }
    }

    Ok(())
}
