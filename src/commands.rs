//! CLI command definitions
//!
//! Defines the clap commands for the broker CLI.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    // === Session starters ===
    /// Compile and debug a Go package
    Debug {
        /// Package to build (default: current directory)
        package: Option<String>,

        /// Flags passed to the Go compiler
        #[arg(long)]
        build_flags: Option<String>,
    },

    /// Attach to a running process
    Attach {
        /// Process ID to attach to
        pid: u32,
    },

    /// Debug a precompiled binary
    Exec {
        /// Path to the binary
        binary: String,

        /// Arguments to pass to the program
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Compile and debug a package's tests
    Test {
        /// Package to test (default: current directory)
        package: Option<String>,

        /// Flags passed to the test binary
        #[arg(last = true)]
        test_flags: Vec<String>,
    },

    /// Examine a core dump
    Core {
        /// Executable that produced the dump
        executable: String,

        /// Path to the core file
        core_path: String,
    },

    /// Start a DAP server
    Dap {
        /// Dial out to a waiting DAP client instead of listening
        #[arg(long)]
        client_addr: Option<String>,
    },

    /// Replay an rr trace
    Replay {
        /// Path to the trace directory
        trace_path: String,

        /// Process ID to start replaying from
        #[arg(long)]
        on_process: Option<u32>,
    },

    /// Trace functions matching a regular expression
    Trace {
        /// Function name pattern
        regexp: String,

        /// Package to build (default: current directory)
        package: Option<String>,

        /// Use eBPF tracing
        #[arg(long)]
        ebpf: bool,

        /// Stack depth to print for each hit
        #[arg(long, short)]
        stack: Option<u32>,

        /// Trace a running process instead of building
        #[arg(long, short)]
        pid: Option<u32>,
    },

    // === Breakpoints ===
    /// Set a breakpoint at file:line
    #[command(name = "break", alias = "b")]
    Break {
        /// Session ID
        session: String,

        /// Location as file:line
        location: String,

        /// Only stop when this expression is true
        #[arg(long, short)]
        condition: Option<String>,
    },

    /// Remove a breakpoint
    Clear {
        /// Session ID
        session: String,

        /// Breakpoint ID
        id: i64,
    },

    /// List breakpoints of a session
    Breakpoints {
        /// Session ID
        session: String,
    },

    // === Execution control ===
    /// Continue execution
    #[command(alias = "c")]
    Continue {
        /// Session ID
        session: String,
    },

    /// Step over the current line
    #[command(alias = "n")]
    Next {
        /// Session ID
        session: String,
    },

    /// Step into the current line
    #[command(alias = "s")]
    Step {
        /// Session ID
        session: String,
    },

    /// Run until the current function returns
    #[command(name = "stepout", alias = "out")]
    StepOut {
        /// Session ID
        session: String,
    },

    // === Inspection ===
    /// List local variables
    Locals {
        /// Session ID
        session: String,
    },

    /// Evaluate an expression
    #[command(alias = "p")]
    Eval {
        /// Session ID
        session: String,

        /// Expression to evaluate
        expression: String,
    },

    // === Session management ===
    /// List live sessions
    Sessions,

    /// Show a session's resource document
    Show {
        /// Session ID or delve:///<id> URI
        session: String,
    },

    /// Stop a session and kill its backend
    Stop {
        /// Session ID
        session: String,
    },

    /// Drop sessions whose backend has exited
    Reconcile,

    // === Backend settings ===
    /// Select the low-level backend for new sessions
    Backend {
        /// One of: default, native, lldb, rr
        name: String,
    },

    /// Enable backend logging for new sessions
    Log {
        /// Components to log (debugger, gdbwire, lldbout, debuglineerr, rpc, dap, fncall, minidump, stack)
        #[arg(required = true, value_delimiter = ',')]
        components: Vec<String>,

        /// File or file descriptor for log output
        #[arg(long)]
        dest: Option<String>,
    },

    /// Print the backend's version
    Version,

    // === Daemon ===
    /// Show daemon status
    Status,

    /// Stop every session and the daemon
    Shutdown,

    /// Run in daemon mode (internal use)
    #[command(hide = true)]
    Daemon,
}
