//! CLI command handling
//!
//! Dispatches CLI commands to the daemon and formats output.

mod spawn;

use colored::Colorize;

use crate::backend::types::{DebuggerState, Variable};
use crate::backend::{DebuggerBackend, ExecutionCommand, LaunchSpec};
use crate::commands::Commands;
use crate::common::{Error, Result};
use crate::ipc::protocol::{
    BreakpointList, Command, EvaluateResult, ExecuteResult, SessionList, StatusResult,
    VariablesResult,
};
use crate::ipc::DaemonClient;
use crate::session::{Breakpoint, SessionResource, SessionSummary, RESOURCE_SCHEME};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Daemon => Err(Error::Internal(
            "daemon mode is handled before dispatch".to_string(),
        )),

        // === Session starters ===
        Commands::Debug {
            package,
            build_flags,
        } => start(LaunchSpec::Debug {
            package,
            build_flags,
        })
        .await,

        Commands::Attach { pid } => start(LaunchSpec::Attach { pid }).await,

        Commands::Exec { binary, args } => start(LaunchSpec::Exec { binary, args }).await,

        Commands::Test {
            package,
            test_flags,
        } => start(LaunchSpec::Test {
            package,
            test_flags,
        })
        .await,

        Commands::Core {
            executable,
            core_path,
        } => start(LaunchSpec::Core {
            executable,
            core_path,
        })
        .await,

        Commands::Dap { client_addr } => start(LaunchSpec::Dap { client_addr }).await,

        Commands::Replay {
            trace_path,
            on_process,
        } => start(LaunchSpec::Replay {
            trace_path,
            on_process,
        })
        .await,

        Commands::Trace {
            regexp,
            package,
            ebpf,
            stack,
            pid,
        } => start(LaunchSpec::Trace {
            regexp,
            package,
            ebpf,
            stack,
            pid,
        })
        .await,

        // === Breakpoints ===
        Commands::Break {
            session,
            location,
            condition,
        } => {
            let (file, line) = parse_location(&location)?;
            let mut client = DaemonClient::connect().await?;
            let bp: Breakpoint = client
                .request(Command::BreakpointSet {
                    session,
                    file,
                    line,
                    condition,
                })
                .await?;
            println!("Breakpoint {} set at {}:{}", bp.id, bp.file, bp.line);
            Ok(())
        }

        Commands::Clear { session, id } => {
            let mut client = DaemonClient::connect().await?;
            let bp: Breakpoint = client
                .request(Command::BreakpointRemove { session, id })
                .await?;
            println!("Breakpoint {} removed ({}:{})", bp.id, bp.file, bp.line);
            Ok(())
        }

        Commands::Breakpoints { session } => {
            let mut client = DaemonClient::connect().await?;
            let list: BreakpointList = client.request(Command::BreakpointList { session }).await?;
            if list.breakpoints.is_empty() {
                println!("No breakpoints set");
            } else {
                println!("Breakpoints:");
                for bp in &list.breakpoints {
                    print_breakpoint(bp);
                }
            }
            Ok(())
        }

        // === Execution control ===
        Commands::Continue { session } => execute(session, ExecutionCommand::Continue).await,
        Commands::Next { session } => execute(session, ExecutionCommand::Next).await,
        Commands::Step { session } => execute(session, ExecutionCommand::Step).await,
        Commands::StepOut { session } => execute(session, ExecutionCommand::StepOut).await,

        // === Inspection ===
        Commands::Locals { session } => {
            let mut client = DaemonClient::connect().await?;
            let result: VariablesResult = client.request(Command::Variables { session }).await?;
            if result.variables.is_empty() {
                println!("No local variables");
            } else {
                for var in &result.variables {
                    print_variable(var, 0);
                }
            }
            Ok(())
        }

        Commands::Eval {
            session,
            expression,
        } => {
            let mut client = DaemonClient::connect().await?;
            let result: EvaluateResult = client
                .request(Command::Evaluate {
                    session,
                    expr: expression,
                })
                .await?;
            let var = &result.variable;
            if var.type_name.is_empty() {
                println!("{}", var.value);
            } else {
                println!("{} {}", var.value, format!("({})", var.type_name).dimmed());
            }
            for child in &var.children {
                print_variable(child, 1);
            }
            Ok(())
        }

        // === Session management ===
        Commands::Sessions => {
            let mut client = DaemonClient::connect().await?;
            let list: SessionList = client.request(Command::Sessions).await?;
            if list.sessions.is_empty() {
                println!("No active sessions");
            } else {
                for session in &list.sessions {
                    print_session(session);
                }
            }
            Ok(())
        }

        Commands::Show { session } => {
            let mut client = DaemonClient::connect().await?;
            let resource: SessionResource = client
                .request(Command::Resource {
                    uri: resource_uri(&session),
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
            Ok(())
        }

        Commands::Stop { session } => {
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::Stop { session: session.clone() }).await?;
            println!("Session {} stopped", session);
            Ok(())
        }

        Commands::Reconcile => {
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::Reconcile).await?;
            let removed: Vec<String> = serde_json::from_value(result["removed"].clone())?;
            if removed.is_empty() {
                println!("All sessions alive");
            } else {
                for id in removed {
                    println!("Removed exited session {}", id);
                }
            }
            Ok(())
        }

        // === Backend settings ===
        Commands::Backend { name } => {
            let backend: DebuggerBackend = name.parse()?;
            spawn::ensure_daemon_running().await?;
            let mut client = DaemonClient::connect().await?;
            client.send_command(Command::SetBackend { backend }).await?;
            println!("New sessions will use the '{}' backend", backend.as_str());
            Ok(())
        }

        Commands::Log { components, dest } => {
            spawn::ensure_daemon_running().await?;
            let mut client = DaemonClient::connect().await?;
            client
                .send_command(Command::ConfigureLogging {
                    components: components.clone(),
                    destination: dest.clone(),
                })
                .await?;
            match dest {
                Some(dest) => println!("Logging {} to {}", components.join(","), dest),
                None => println!("Logging {}", components.join(",")),
            }
            Ok(())
        }

        Commands::Version => {
            spawn::ensure_daemon_running().await?;
            let mut client = DaemonClient::connect().await?;
            let result = client.send_command(Command::Version).await?;
            print!("{}", result["version"].as_str().unwrap_or_default());
            Ok(())
        }

        // === Daemon ===
        Commands::Status => {
            match DaemonClient::connect().await {
                Ok(mut client) => {
                    let status: StatusResult = client.request(Command::Status).await?;
                    println!("Daemon: {} (pid {})", "running".green(), status.pid);
                    println!("Sessions: {}", status.sessions);
                    if let Some(backend) = status.backend {
                        println!("Backend: {}", backend.as_str());
                    }
                    if !status.log_components.is_empty() {
                        println!("Logging: {}", status.log_components.join(","));
                    }
                }
                Err(Error::DaemonNotRunning) => {
                    println!("Daemon: {}", "not running".yellow());
                }
                Err(e) => return Err(e),
            }
            Ok(())
        }

        Commands::Shutdown => {
            match DaemonClient::connect().await {
                Ok(mut client) => {
                    client.send_command(Command::Shutdown).await?;
                    println!("Daemon stopped");
                }
                Err(Error::DaemonNotRunning) => println!("Daemon not running"),
                Err(e) => return Err(e),
            }
            Ok(())
        }
    }
}

async fn start(spec: LaunchSpec) -> Result<()> {
    spec.validate()?;
    spawn::ensure_daemon_running().await?;
    let mut client = DaemonClient::connect().await?;

    let summary: SessionSummary = client.request(Command::Start { spec }).await?;
    println!(
        "Started {} session {} on port {}",
        summary.kind,
        summary.id.bold(),
        summary.port
    );
    if !summary.target.is_empty() {
        println!("  Target: {}", summary.target);
    }
    println!("  Resource: {}", summary.uri);
    Ok(())
}

async fn execute(session: String, command: ExecutionCommand) -> Result<()> {
    let mut client = DaemonClient::connect().await?;
    let result: ExecuteResult = client.request(Command::Execute { session, command }).await?;
    print_state(&result.state);
    Ok(())
}

/// Split `file:line`, using the last colon so Windows drive letters survive
fn parse_location(location: &str) -> Result<(String, u32)> {
    let invalid = || {
        Error::invalid_argument(format!(
            "invalid breakpoint location '{}', expected file:line",
            location
        ))
    };

    let (file, line) = location.rsplit_once(':').ok_or_else(invalid)?;
    if file.is_empty() || line.is_empty() || !line.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let line: u32 = line.parse().map_err(|_| invalid())?;
    Ok((file.to_string(), line))
}

/// Accept a bare session ID where a resource URI is expected
fn resource_uri(session: &str) -> String {
    if session.contains("://") {
        session.to_string()
    } else {
        format!("{}:///{}", RESOURCE_SCHEME, session)
    }
}

fn print_session(session: &SessionSummary) {
    let status = if session.alive {
        "alive".green()
    } else {
        "exited".red()
    };
    let pid = session
        .pid
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".to_string());

    print!(
        "{}  {:<7} port {:<5}  pid {:<7} {}",
        session.id.bold(),
        session.kind.to_string(),
        session.port,
        pid,
        status
    );
    if !session.target.is_empty() {
        print!("  {}", session.target);
    }
    if session.breakpoints > 0 {
        print!("  ({} breakpoints)", session.breakpoints);
    }
    println!();
}

fn print_breakpoint(bp: &Breakpoint) {
    match &bp.condition {
        Some(cond) => println!("  {} {}:{} (if {})", bp.id, bp.file, bp.line, cond),
        None => println!("  {} {}:{}", bp.id, bp.file, bp.line),
    }
}

fn print_state(state: &DebuggerState) {
    if state.exited {
        println!("Process exited with status {}", state.exit_status);
        return;
    }
    if state.running {
        println!("Running");
        return;
    }
    match &state.current_thread {
        Some(thread) if !thread.file.is_empty() => {
            println!("Stopped at {}:{}", thread.file, thread.line);
        }
        _ => println!("Stopped"),
    }
}

fn print_variable(var: &Variable, depth: usize) {
    let indent = "  ".repeat(depth);
    if var.type_name.is_empty() {
        println!("{}{} = {}", indent, var.name.cyan(), var.value);
    } else {
        println!(
            "{}{} = {} {}",
            indent,
            var.name.cyan(),
            var.value,
            format!("({})", var.type_name).dimmed()
        );
    }
    for child in &var.children {
        print_variable(child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("main.go:10").unwrap(), ("main.go".to_string(), 10));
        assert_eq!(
            parse_location(r"C:\src\main.go:42").unwrap(),
            (r"C:\src\main.go".to_string(), 42)
        );
        assert!(parse_location("main.go").is_err());
        assert!(parse_location("main.go:").is_err());
        assert!(parse_location(":10").is_err());
        assert!(parse_location("main.go:ten").is_err());
    }

    #[test]
    fn test_resource_uri() {
        assert_eq!(resource_uri("k3j9x2"), "delve:///k3j9x2");
        assert_eq!(resource_uri("delve:///k3j9x2"), "delve:///k3j9x2");
    }
}
