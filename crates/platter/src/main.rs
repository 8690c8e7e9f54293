use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "platter", about = "platter — record-store catalog server and client", version)]
struct Cli {
    /// Server URL (default: http://localhost:3000 or $PLATTER_SERVER)
    #[arg(long, env = "PLATTER_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Session token, as printed by `login` or `signup` ($PLATTER_TOKEN)
    #[arg(long, env = "PLATTER_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (default: $PLATTER_PORT or 3000)
        #[arg(long, env = "PLATTER_PORT", default_value = "3000")]
        port: u16,
        /// Host to bind (default: $PLATTER_HOST or 0.0.0.0)
        #[arg(long, env = "PLATTER_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Create an account and print the new session token
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Log in and print the new session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Revoke the current session token
    Logout,
    /// List all albums
    List,
    /// Show one album
    Get {
        /// Album id
        id: String,
    },
    /// Add an album
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        performer: Option<String>,
        #[arg(long)]
        cost: Option<f64>,
    },
    /// Delete an album
    Remove {
        /// Album id
        id: String,
    },
    /// Record a purchase of an album by a user
    Buy {
        /// User id
        #[arg(long)]
        user: String,
        /// Album id
        #[arg(long)]
        album: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so env-backed flags see it.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PLATTER_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let api = Api::new(&cli.server, cli.token);

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,

        Commands::Signup {
            email,
            password,
            name,
        } => cmd_signup(&api, &email, &password, name.as_deref()).await,

        Commands::Login { email, password } => cmd_login(&api, &email, &password).await,

        Commands::Logout => {
            api.require_token()?;
            cmd_logout(&api).await
        }

        Commands::List => cmd_list(&api).await,

        Commands::Get { id } => cmd_get(&api, &id).await,

        Commands::Add {
            title,
            performer,
            cost,
        } => {
            api.require_token()?;
            cmd_add(&api, &title, performer.as_deref(), cost).await
        }

        Commands::Remove { id } => {
            api.require_token()?;
            cmd_remove(&api, &id).await
        }

        Commands::Buy { user, album } => {
            api.require_token()?;
            cmd_buy(&api, &user, &album).await
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = platter_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };

    // A store that cannot be opened is fatal; there is no degraded mode.
    if let Err(e) = platter_server::run(cfg).await {
        error!(error = %format!("{e:#}"), "server stopped");
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_signup(api: &Api, email: &str, password: &str, name: Option<&str>) -> Result<()> {
    let body = json!({ "email": email, "password": password, "name": name });
    let resp = api.send(api.post("/signup").json(&body)).await?;
    println!("{}", session_header(&resp)?);
    Ok(())
}

async fn cmd_login(api: &Api, email: &str, password: &str) -> Result<()> {
    let body = json!({ "email": email, "password": password });
    let resp = api.send(api.post("/login").json(&body)).await?;
    println!("{}", session_header(&resp)?);
    Ok(())
}

async fn cmd_logout(api: &Api) -> Result<()> {
    api.send(api.post("/logout")).await?;
    println!("✓ logged out");
    Ok(())
}

async fn cmd_list(api: &Api) -> Result<()> {
    let resp = api.send(api.get("/albums")).await?;
    let json: Value = resp.json().await.context("parse response")?;
    let albums: Vec<AlbumItem> =
        serde_json::from_value(json["data"].clone()).context("parse album list")?;

    if albums.is_empty() {
        println!("(no albums)");
        return Ok(());
    }
    for album in &albums {
        println!("  {album}");
    }
    Ok(())
}

async fn cmd_get(api: &Api, id: &str) -> Result<()> {
    let resp = api.send(api.get(&format!("/albums/{id}"))).await?;
    let json: Value = resp.json().await.context("parse response")?;
    let album: Option<AlbumItem> =
        serde_json::from_value(json["data"].clone()).context("parse album")?;

    match album {
        Some(album) => println!("{album}"),
        None => anyhow::bail!("no album with id {id}"),
    }
    Ok(())
}

async fn cmd_add(api: &Api, title: &str, performer: Option<&str>, cost: Option<f64>) -> Result<()> {
    let body = json!({ "title": title, "performer": performer, "cost": cost });
    let resp = api.send(api.post("/albums").json(&body)).await?;
    let json: Value = resp.json().await.context("parse response")?;
    let album: AlbumItem =
        serde_json::from_value(json["data"].clone()).context("parse created album")?;
    println!("✓ added {}", album.id);
    Ok(())
}

async fn cmd_remove(api: &Api, id: &str) -> Result<()> {
    api.send(api.delete(&format!("/albums/{id}"))).await?;
    println!("✓ removed {id}");
    Ok(())
}

async fn cmd_buy(api: &Api, user: &str, album: &str) -> Result<()> {
    let body = json!({ "user": user, "album": album });
    let resp = api.send(api.post("/purchases").json(&body)).await?;
    let json: Value = resp.json().await.context("parse response")?;
    let data = &json["data"];

    let title = data["album"]["title"].as_str().unwrap_or("(unknown album)");
    let buyer = data["user"]["email"].as_str().unwrap_or("(unknown user)");
    println!(
        "✓ purchase {}: {title} for {buyer}",
        data["_id"].as_str().unwrap_or("?")
    );
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Api {
    client: Client,
    base: String,
    token: Option<String>,
}

impl Api {
    fn new(server: &str, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base: server.trim_end_matches('/').to_owned(),
            token,
        }
    }

    fn require_token(&self) -> Result<()> {
        self.token
            .as_ref()
            .map(|_| ())
            .context("--token / PLATTER_TOKEN is required for this command")
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(format!("{}{path}", self.base)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(format!("{}{path}", self.base)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.delete(format!("{}{path}", self.base)))
    }

    // The token already carries its `Bearer ` prefix, so it is sent verbatim.
    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await.context("HTTP request failed")?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let json: Value = resp.json().await.unwrap_or_default();
        let message = json["err"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .unwrap_or("");
        anyhow::bail!("server returned {status}: {message}");
    }
}

fn session_header(resp: &Response) -> Result<String> {
    resp.headers()
        .get(reqwest::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .context("server did not return a session token")
}

#[derive(Deserialize)]
struct AlbumItem {
    #[serde(rename = "_id")]
    id: String,
    title: Option<String>,
    performer: Option<String>,
    cost: Option<f64>,
}

impl std::fmt::Display for AlbumItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} — {} — {}",
            self.id,
            self.title.as_deref().unwrap_or("(untitled)"),
            self.performer.as_deref().unwrap_or("(unknown performer)"),
        )?;
        if let Some(cost) = self.cost {
            write!(f, " — {cost}")?;
        }
        Ok(())
    }
}
