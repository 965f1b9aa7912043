//! Exécution de commandes externes bornée dans le temps.
//!
//! Toutes les interactions avec le système (systemctl, bluetoothctl, wpctl,
//! pactl) passent par le trait [`CommandRunner`]. L'implémentation réelle,
//! [`SystemRunner`], lance chaque commande dans son propre groupe de
//! processus : en cas de timeout, c'est le groupe entier qui est tué, pour ne
//! pas laisser de descendants orphelins.
//!
//! [`ScriptedRunner`] rejoue des réponses prédéfinies et enregistre les
//! commandes reçues. Il sert au mode `--dry-run` du binaire et aux tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Timeout minimal appliqué par [`SystemRunner`]
pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Délai accordé après le kill pour récupérer la sortie déjà produite
const DRAIN_AFTER_KILL: Duration = Duration::from_secs(1);

/// Résultat uniforme d'une commande externe.
///
/// Un échec de lancement, un code de sortie non nul ou un timeout sont tous
/// représentés par `ok == false`; aucune de ces situations ne produit d'erreur.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub ok: bool,
    /// Code de sortie, absent si le processus a été tué ou n'a pas démarré
    pub exit_code: Option<i32>,
    /// Ligne de commande affichable (arguments quotés façon shell)
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Construit un résultat d'échec sans exécution (spawn impossible, etc.)
    pub fn failure(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            ok: false,
            command: command.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Message le plus parlant : stderr s'il existe, sinon stdout
    pub fn detail(&self) -> &str {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Exécuteur de commandes externes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Lance `program args…` et attend au plus `timeout`.
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput;
}

/// Rend une ligne de commande lisible, en quotant les arguments qui le nécessitent.
pub fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .map(shell_quote)
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(word: &str) -> String {
    if word.is_empty() {
        return "''".to_string();
    }
    let safe = word
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r#"'"'"'"#))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn lossy_trimmed(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

// ============ Exécuteur réel ============

/// Exécuteur basé sur `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandOutput {
        let started = Instant::now();
        let command = render_command(program, args);
        let timeout = timeout.max(MIN_TIMEOUT);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Nouveau groupe dont le leader est l'enfant : pgid == pid
        #[cfg(unix)]
        cmd.process_group(0);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to spawn command");
                let mut out = CommandOutput::failure(command, e.to_string());
                out.elapsed_ms = elapsed_ms(started);
                return out;
            }
        };

        let pid = child.id();
        let wait = child.wait_with_output();
        tokio::pin!(wait);

        match tokio::time::timeout(timeout, &mut wait).await {
            Ok(Ok(output)) => {
                let out = CommandOutput {
                    ok: output.status.success(),
                    exit_code: output.status.code(),
                    command,
                    stdout: lossy_trimmed(&output.stdout),
                    stderr: lossy_trimmed(&output.stderr),
                    elapsed_ms: elapsed_ms(started),
                    timed_out: false,
                };
                trace!(command = %out.command, ok = out.ok, elapsed_ms = out.elapsed_ms, "Command finished");
                out
            }
            Ok(Err(e)) => {
                warn!(command = %command, error = %e, "Failed to collect command output");
                let mut out = CommandOutput::failure(command, e.to_string());
                out.elapsed_ms = elapsed_ms(started);
                out
            }
            Err(_) => {
                kill_process_group(pid);
                let stdout = match tokio::time::timeout(DRAIN_AFTER_KILL, &mut wait).await {
                    Ok(Ok(output)) => lossy_trimmed(&output.stdout),
                    _ => String::new(),
                };
                warn!(command = %command, timeout = ?timeout, "Command timed out, process group killed");
                CommandOutput {
                    ok: false,
                    exit_code: None,
                    command,
                    stdout,
                    stderr: format!("command timed out after {:?}", timeout),
                    elapsed_ms: elapsed_ms(started),
                    timed_out: true,
                }
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    let pgid = pid as libc::pid_t;
    // SAFETY: simple envoi de signal au groupe créé pour cet enfant
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        // SAFETY: idem, repli sur l'enfant direct
        let rc = unsafe { libc::kill(pgid, libc::SIGKILL) };
        if rc != 0 {
            debug!(pid, "Process group already gone");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

// ============ Exécuteur scripté ============

/// Réponse prédéfinie d'un [`ScriptedRunner`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ScriptedReply {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    pub fn fail(stderr: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Sortie non nulle avec un stdout (ex: `systemctl is-active` → `inactive`)
    pub fn fail_with_stdout(stdout: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: "command timed out".to_string(),
            timed_out: true,
        }
    }
}

/// Exécuteur qui n'exécute rien : il enregistre les commandes et répond
/// d'après des règles.
///
/// Une règle associe un motif (sous-chaîne de la ligne de commande rendue)
/// à une réponse. La règle ajoutée en dernier est prioritaire. Sans règle,
/// la commande réussit avec une sortie vide, sauf `is-active` qui répond
/// `active`.
///
/// ```
/// use pbxutils::{ScriptedReply, ScriptedRunner};
///
/// let runner = ScriptedRunner::new();
/// runner.on("start librespot", ScriptedReply::fail("Job failed"));
/// ```
#[derive(Debug)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, ScriptedReply)>>,
    calls: Mutex<Vec<String>>,
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self {
            rules: Mutex::new(vec![("is-active".to_string(), ScriptedReply::ok("active"))]),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Ajoute une règle; elle masque les règles plus anciennes de même motif.
    pub fn on(&self, pattern: impl Into<String>, reply: ScriptedReply) -> &Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((pattern.into(), reply));
        self
    }

    /// Commandes reçues, dans l'ordre
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Vide et retourne l'historique des commandes
    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Nombre de commandes reçues contenant `pattern`
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    fn reply_for(&self, command: &str) -> ScriptedReply {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| ScriptedReply::ok(""))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str], _timeout: Duration) -> CommandOutput {
        let command = render_command(program, args);
        debug!(command = %command, "Scripted command");
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(command.clone());
        let reply = self.reply_for(&command);
        CommandOutput {
            ok: reply.ok,
            exit_code: if reply.timed_out {
                None
            } else if reply.ok {
                Some(0)
            } else {
                Some(1)
            },
            command,
            stdout: reply.stdout,
            stderr: reply.stderr,
            elapsed_ms: 0,
            timed_out: reply.timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_command_quotes_when_needed() {
        assert_eq!(
            render_command("sudo", &["-n", "systemctl", "stop", "librespot.service"]),
            "sudo -n systemctl stop librespot.service"
        );
        assert_eq!(
            render_command("bluetoothctl", &["system-alias", "PartyBox BT"]),
            "bluetoothctl system-alias 'PartyBox BT'"
        );
        assert_eq!(render_command("echo", &[""]), "echo ''");
        assert_eq!(
            render_command("wpctl", &["set-mute", "@DEFAULT_AUDIO_SINK@", "1"]),
            "wpctl set-mute @DEFAULT_AUDIO_SINK@ 1"
        );
    }

    #[test]
    fn test_detail_prefers_stderr() {
        let mut out = CommandOutput::failure("x", "boom");
        out.stdout = "partial".into();
        assert_eq!(out.detail(), "boom");
        out.stderr.clear();
        assert_eq!(out.detail(), "partial");
    }

    #[tokio::test]
    async fn test_scripted_runner_rules_and_calls() {
        let runner = ScriptedRunner::new();
        runner.on("start librespot", ScriptedReply::fail("Job failed"));

        let out = runner
            .run("systemctl", &["start", "librespot.service"], Duration::from_secs(1))
            .await;
        assert!(!out.ok);
        assert_eq!(out.stderr, "Job failed");

        let out = runner
            .run("systemctl", &["is-active", "librespot.service"], Duration::from_secs(1))
            .await;
        assert!(out.ok);
        assert_eq!(out.stdout, "active");

        // La dernière règle l'emporte
        runner.on("is-active", ScriptedReply::fail_with_stdout("inactive"));
        let out = runner
            .run("systemctl", &["is-active", "librespot.service"], Duration::from_secs(1))
            .await;
        assert!(!out.ok);
        assert_eq!(out.stdout, "inactive");

        assert_eq!(runner.calls().len(), 3);
        assert_eq!(runner.count_matching("is-active"), 2);
        assert_eq!(runner.take_calls().len(), 3);
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_runner_survives_poisoned_lock() {
        let runner = std::sync::Arc::new(ScriptedRunner::new());
        let poisoner = std::sync::Arc::clone(&runner);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.calls.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(runner.calls.is_poisoned());

        let out = runner
            .run("systemctl", &["is-active", "bluetooth.service"], Duration::from_secs(1))
            .await;
        assert!(out.ok);
        assert_eq!(runner.calls(), vec!["systemctl is-active bluetooth.service"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_success_and_failure() {
        let runner = SystemRunner::new();

        let out = runner
            .run("sh", &["-c", "echo hello; echo oops >&2"], Duration::from_secs(5))
            .await;
        assert!(out.ok);
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "hello");
        assert_eq!(out.stderr, "oops");
        assert!(!out.timed_out);

        let out = runner.run("sh", &["-c", "exit 3"], Duration::from_secs(5)).await;
        assert!(!out.ok);
        assert_eq!(out.exit_code, Some(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_missing_program() {
        let runner = SystemRunner::new();
        let out = runner
            .run("pbx-definitely-not-installed", &[], Duration::from_secs(1))
            .await;
        assert!(!out.ok);
        assert_eq!(out.exit_code, None);
        assert!(!out.stderr.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_timeout_kills_group() {
        let runner = SystemRunner::new();
        let started = Instant::now();
        // Le shell lance un petit-enfant : seul le kill du groupe libère la sortie
        let out = runner
            .run("sh", &["-c", "echo started; sleep 30 & sleep 30"], Duration::from_millis(10))
            .await;
        assert!(out.timed_out);
        assert!(!out.ok);
        assert_eq!(out.exit_code, None);
        assert!(out.stderr.contains("timed out"));
        // 1 s de timeout minimal + 1 s de drainage au plus
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
