// CodePair Server CLI
// Operator tool for exercising the REST surface and realtime interview sessions

use clap::{Parser, Subcommand};
use colored::*;
use futures::{SinkExt, StreamExt};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::json;
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
};

#[derive(Parser)]
#[command(name = "codepair-cli")]
#[command(about = "CodePair Server CLI", long_about = None)]
struct Cli {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:4000")]
    server: String,

    /// JWT secret used to sign tokens (must match the server's)
    #[arg(long, default_value = "codepair-dev-secret")]
    secret: String,

    /// Origin header presented on the realtime handshake
    #[arg(long, default_value = "http://localhost:3000")]
    origin: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health endpoint
    Health,

    /// Print a signed bearer token for a user
    Token {
        /// User ID to sign the token for
        #[arg(short, long)]
        user: String,
    },

    /// Create a new interview room
    Create {
        /// User ID creating the room
        #[arg(short, long)]
        user: String,

        /// Specific question ID (random when omitted)
        #[arg(short, long)]
        question_id: Option<String>,
    },

    /// Join an interview room by ID
    Join {
        /// Room ID to join
        #[arg(short, long)]
        room_id: String,

        /// User ID joining the room
        #[arg(short, long)]
        user: String,
    },

    /// Match into a waiting room (or create one) by filters
    Match {
        /// User ID to match
        #[arg(short, long)]
        user: String,

        /// Question difficulty filter (easy|medium|hard)
        #[arg(short, long)]
        difficulty: Option<String>,

        /// Question topic filter
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Fetch an interview room
    Get {
        /// Room ID to fetch
        #[arg(short, long)]
        room_id: String,

        /// Requesting user ID (must be a participant)
        #[arg(short, long)]
        user: String,
    },

    /// Complete an interview room
    Complete {
        /// Room ID to complete
        #[arg(short, long)]
        room_id: String,

        /// Requesting user ID (must be a participant)
        #[arg(short, long)]
        user: String,
    },

    /// Open a live session: join the room and type code updates interactively
    Session {
        /// Room ID to join
        #[arg(short, long)]
        room_id: String,

        /// User ID (must already be a participant)
        #[arg(short, long)]
        user: String,
    },
}

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Health => {
            check_health(&cli.server).await;
        }
        Commands::Token { user } => {
            match sign_token(&cli.secret, user) {
                Ok(token) => println!("{}", token),
                Err(e) => println!("{} Failed to sign token: {}", "✗".red(), e),
            }
        }
        Commands::Create { user, question_id } => {
            let body = match question_id {
                Some(id) => json!({ "questionId": id }),
                None => json!({}),
            };
            post_room(&cli, user, "api/interviews", Some(body)).await;
        }
        Commands::Join { room_id, user } => {
            let path = format!("api/interviews/join/{}", room_id);
            post_room(&cli, user, &path, None).await;
        }
        Commands::Match {
            user,
            difficulty,
            topic,
        } => {
            match_room(&cli, user, difficulty.as_deref(), topic.as_deref()).await;
        }
        Commands::Get { room_id, user } => {
            get_room(&cli, user, room_id).await;
        }
        Commands::Complete { room_id, user } => {
            let path = format!("api/interviews/{}/complete", room_id);
            post_room(&cli, user, &path, None).await;
        }
        Commands::Session { room_id, user } => {
            run_session(&cli, user, room_id).await;
        }
    }
}

fn sign_token(secret: &str, user: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs() as usize
        + 86400;
    let claims = Claims {
        sub: user.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

async fn check_health(server: &str) {
    println!("{}", "Checking server health...".cyan());

    let url = format!("http://{}/health", server);
    let client = reqwest::Client::new();

    match client.get(&url).send().await {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                println!("{} Health check passed", "✓".green());

                if let Ok(body) = resp.json::<serde_json::Value>().await {
                    println!("  Status: {}", body["status"].as_str().unwrap_or("unknown"));
                    println!("  Service: {}", body["service"].as_str().unwrap_or("unknown"));
                    println!("  Version: {}", body["version"].as_str().unwrap_or("unknown"));
                }
            } else {
                println!("{} Health check failed: {}", "✗".red(), status);
            }
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
            println!("  Make sure the server is running on {}", server);
        }
    }
}

async fn post_room(cli: &Cli, user: &str, path: &str, body: Option<serde_json::Value>) {
    let token = match sign_token(&cli.secret, user) {
        Ok(token) => token,
        Err(e) => {
            println!("{} Failed to sign token: {}", "✗".red(), e);
            return;
        }
    };

    let url = format!("http://{}/{}", cli.server, path);
    let client = reqwest::Client::new();
    let mut request = client.post(&url).bearer_auth(token);
    if let Some(body) = body {
        request = request.json(&body);
    }

    match request.send().await {
        Ok(resp) => print_room_response(resp).await,
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn match_room(cli: &Cli, user: &str, difficulty: Option<&str>, topic: Option<&str>) {
    let token = match sign_token(&cli.secret, user) {
        Ok(token) => token,
        Err(e) => {
            println!("{} Failed to sign token: {}", "✗".red(), e);
            return;
        }
    };

    println!("{}", "Matching for an interview...".cyan());

    let url = format!("http://{}/api/interviews/match", cli.server);
    let mut query: Vec<(&str, &str)> = Vec::new();
    if let Some(difficulty) = difficulty {
        query.push(("difficulty", difficulty));
    }
    if let Some(topic) = topic {
        query.push(("topic", topic));
    }

    let client = reqwest::Client::new();
    match client.get(&url).query(&query).bearer_auth(token).send().await {
        Ok(resp) => print_room_response(resp).await,
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn get_room(cli: &Cli, user: &str, room_id: &str) {
    let token = match sign_token(&cli.secret, user) {
        Ok(token) => token,
        Err(e) => {
            println!("{} Failed to sign token: {}", "✗".red(), e);
            return;
        }
    };

    let url = format!("http://{}/api/interviews/{}", cli.server, room_id);
    let client = reqwest::Client::new();
    match client.get(&url).bearer_auth(token).send().await {
        Ok(resp) => print_room_response(resp).await,
        Err(e) => println!("{} Cannot connect to server: {}", "✗".red(), e),
    }
}

async fn print_room_response(resp: reqwest::Response) {
    let status = resp.status();
    let body: serde_json::Value = match resp.json().await {
        Ok(body) => body,
        Err(e) => {
            println!("{} Invalid response body: {}", "✗".red(), e);
            return;
        }
    };

    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("unknown error");
        println!("{} {} ({})", "✗".red(), message, status);
        return;
    }

    let room = &body["data"];
    println!("{} Request succeeded", "✓".green());
    println!("\n{}", "═".repeat(50).green());
    println!(
        "{} {}",
        "Room ID:".bold(),
        room["roomId"].as_str().unwrap_or("unknown").green().bold()
    );
    println!(
        "  Status:       {}",
        room["status"].as_str().unwrap_or("unknown")
    );
    if let Some(participants) = room["participants"].as_array() {
        let list: Vec<&str> = participants.iter().filter_map(|p| p.as_str()).collect();
        println!("  Participants: {}", list.join(", "));
    }
    println!(
        "  Question:     {}",
        room["question"]["title"].as_str().unwrap_or("unknown")
    );
    println!("{}", "═".repeat(50).green());
}

async fn run_session(cli: &Cli, user: &str, room_id: &str) {
    let token = match sign_token(&cli.secret, user) {
        Ok(token) => token,
        Err(e) => {
            println!("{} Failed to sign token: {}", "✗".red(), e);
            return;
        }
    };

    println!("\n{}", "Live Interview Session".bold().green());
    println!("{}", "═".repeat(60).green());
    println!(
        "Type a line of code to share it, {} to switch language, {} to quit\n",
        "/lang <name>".cyan(),
        "quit".cyan()
    );

    let url = format!(
        "ws://{}/ws?token={}",
        cli.server,
        urlencoding::encode(&token)
    );
    let mut request = match url.into_client_request() {
        Ok(request) => request,
        Err(e) => {
            println!("{} Invalid server address: {}", "✗".red(), e);
            return;
        }
    };
    request.headers_mut().insert(
        "Origin",
        cli.origin.parse().expect("invalid origin header value"),
    );

    match connect_async(request).await {
        Ok((ws_stream, _)) => {
            println!("{} Connected to server", "✓".green());

            let (mut write, mut read) = ws_stream.split();

            let join_msg = json!({
                "type": "join_room",
                "roomId": room_id,
                "userId": user,
            });
            if write.send(Message::Text(join_msg.to_string())).await.is_err() {
                println!("{} Failed to send join_room", "✗".red());
                return;
            }

            // Wait for the code snapshot that confirms the join
            match timeout(Duration::from_secs(5), read.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    if let Ok(reply) = serde_json::from_str::<serde_json::Value>(&text) {
                        if reply["type"] == "error" {
                            println!(
                                "{} Join rejected: {}",
                                "✗".red(),
                                reply["message"].as_str().unwrap_or("unknown")
                            );
                            return;
                        }
                        println!("{} Joined room {}", "✓".green(), room_id.green().bold());
                        if reply["type"] == "code_update" {
                            let code = reply["code"].as_str().unwrap_or("");
                            if !code.is_empty() {
                                println!("\n{}", "Current shared code:".bold());
                                println!("{}", code.bright_white());
                            }
                        }
                    }
                }
                _ => {
                    println!("{} No response from server", "✗".red());
                    return;
                }
            }

            // Print everything the room sends us
            let receive_task = tokio::spawn(async move {
                while let Some(Ok(msg)) = read.next().await {
                    if let Message::Text(text) = msg {
                        if let Ok(event) = serde_json::from_str::<serde_json::Value>(&text) {
                            match event["type"].as_str() {
                                Some("code_update") => {
                                    println!(
                                        "\n{} [{}] {}",
                                        "◀".green(),
                                        event["language"].as_str().unwrap_or("?"),
                                        event["code"].as_str().unwrap_or("").bright_white()
                                    );
                                }
                                Some("user_joined") => {
                                    println!(
                                        "\n{} {} joined",
                                        "◀".green(),
                                        event["userId"].as_str().unwrap_or("someone").bold()
                                    );
                                }
                                Some("user_left") => {
                                    println!(
                                        "\n{} {} left",
                                        "◀".yellow(),
                                        event["userId"].as_str().unwrap_or("someone").bold()
                                    );
                                }
                                Some("heartbeat") => {}
                                _ => {
                                    println!("\n{} {}", "◀".green(), text.bright_white());
                                }
                            }
                        }
                    }
                }
            });

            let mut language: Option<String> = None;
            loop {
                print!("{} ", "►".cyan());
                io::stdout().flush().unwrap();

                let mut input = String::new();
                if io::stdin().read_line(&mut input).is_err() {
                    break;
                }

                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                if input == "quit" || input == "exit" {
                    println!("Goodbye!");
                    break;
                }
                if let Some(lang) = input.strip_prefix("/lang ") {
                    language = Some(lang.trim().to_string());
                    println!("{} Language set to {}", "✓".green(), lang.trim().cyan());
                    continue;
                }

                let mut update = json!({
                    "type": "code_update",
                    "roomId": room_id,
                    "code": input,
                    "userId": user,
                });
                if let Some(lang) = &language {
                    update["language"] = json!(lang);
                }

                if write.send(Message::Text(update.to_string())).await.is_err() {
                    println!("{} Failed to send update", "✗".red());
                    break;
                }
            }

            receive_task.abort();
        }
        Err(e) => {
            println!("{} Cannot connect to server: {}", "✗".red(), e);
        }
    }
}
