//! Command-line speech synthesis backend
//!
//! Synthesizes each unit with a local CLI engine, with graceful degradation:
//! - Prefer Piper (higher quality, requires voice model)
//! - Fallback to espeak-ng (widely available)
//! - If neither present, the backend reports itself unsupported and the
//!   narrator completes requests without audio
//!
//! Synthesis writes a temporary WAV which is then played with the first
//! available player (aplay|paplay|ffplay, or a preferred one). Without a
//! player, espeak-ng speaks directly and Piper output is kept on disk.
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - NARRATE_VOICE, NARRATE_RATE, NARRATE_VOLUME, NARRATE_SAMPLE_RATE
//! - NARRATE_PLAYER, NARRATE_TEMP_DIR
//!
//! Every child process is killed when its future is dropped, so aborting a
//! narration silences the engine and the player immediately.

use crate::utils::{gen_id, get_from_env_or_path, get_from_path};
use async_trait::async_trait;
use narrate_core::{SynthesisBackend, SynthesisError};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct CliBackendConfig {
    pub temp_dir: PathBuf,
    pub sample_rate: u32,
    /// Piper voice model path or name; espeak voice code
    pub voice: String,
    /// Speech rate, clamped to 0.5–2.0
    pub rate: f32,
    /// Volume, clamped to 0.5–2.0 (espeak-ng only)
    pub volume: f32,
    /// Preferred player binary name or path
    pub player: Option<String>,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
}

impl Default for CliBackendConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir(),
            sample_rate: 16_000,
            voice: String::new(),
            rate: 0.9,
            volume: 1.0,
            player: None,
            piper_bin: None,
            piper_voice: None,
            piper_voice_dir: None,
            espeak_bin: None,
        }
    }
}

impl CliBackendConfig {
    /// Defaults overlaid with environment variables, plus engine discovery on PATH.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("NARRATE_TEMP_DIR") {
            cfg.temp_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_parse::<u32>("NARRATE_SAMPLE_RATE") {
            cfg.sample_rate = v;
        }
        if let Some(v) = env_parse::<f32>("NARRATE_RATE") {
            cfg.rate = v;
        }
        if let Some(v) = env_parse::<f32>("NARRATE_VOLUME") {
            cfg.volume = v;
        }
        if let Ok(voice) = std::env::var("NARRATE_VOICE") {
            cfg.voice = voice;
        }
        cfg.player = std::env::var("NARRATE_PLAYER").ok().filter(|s| !s.is_empty());
        cfg.piper_bin = get_from_env_or_path("PIPER_BIN", "piper");
        cfg.piper_voice = std::env::var("PIPER_VOICE").ok().map(PathBuf::from);
        cfg.piper_voice_dir = std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from);
        cfg.espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));
        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Engine {
    Piper,
    Espeak,
    None,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Piper => "piper",
            Engine::Espeak => "espeak-ng",
            Engine::None => "none",
        }
    }
}

/// Piper needs both a binary and a resolvable voice model.
pub fn select_engine(cfg: &CliBackendConfig) -> Engine {
    if cfg.piper_bin.is_some() && resolve_piper_voice_path(cfg).is_some() {
        return Engine::Piper;
    }
    if cfg.espeak_bin.is_some() {
        return Engine::Espeak;
    }
    Engine::None
}

pub struct CliSynthesisBackend {
    cfg: CliBackendConfig,
    engine: Engine,
    player: Option<PathBuf>,
    busy: AtomicBool,
    cancel: Notify,
}

impl CliSynthesisBackend {
    pub fn new(cfg: CliBackendConfig) -> Self {
        let engine = select_engine(&cfg);
        let player = select_player(cfg.player.as_deref());
        match engine {
            Engine::None => warn!(target: "tts", "No TTS engine detected; narration will be silent"),
            _ => info!(target: "tts", engine = engine.as_str(), player = ?player, "Detected TTS engine"),
        }
        Self {
            cfg,
            engine,
            player,
            busy: AtomicBool::new(false),
            cancel: Notify::new(),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    async fn synthesize(&self, unit: &str, out_wav: &Path) -> Result<(), SynthesisError> {
        let (bin, args) = match self.engine {
            Engine::Piper => {
                let bin = self.cfg.piper_bin.as_ref().ok_or_else(|| {
                    SynthesisError::failed("unsupported", "Piper binary not found")
                })?;
                let voice = resolve_piper_voice_path(&self.cfg).ok_or_else(|| {
                    SynthesisError::failed(
                        "unsupported",
                        "Piper voice not found; set PIPER_VOICE or voice",
                    )
                })?;
                (bin, piper_args(&self.cfg, &voice, out_wav))
            }
            Engine::Espeak => {
                let bin = self.cfg.espeak_bin.as_ref().ok_or_else(|| {
                    SynthesisError::failed("unsupported", "espeak-ng not found")
                })?;
                (bin, espeak_args(&self.cfg, unit, Some(out_wav)))
            }
            Engine::None => {
                return Err(SynthesisError::failed("unsupported", "no TTS engine"));
            }
        };

        let mut cmd = Command::new(bin);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!(target: "tts", command = ?cmd, "Running synthesis");

        let mut child = cmd.spawn().map_err(spawn_error)?;
        if let Some(mut stdin) = child.stdin.take() {
            // Piper reads text from stdin; espeak-ng ignores it
            if self.engine == Engine::Piper {
                stdin
                    .write_all(unit.as_bytes())
                    .await
                    .map_err(spawn_error)?;
            }
        }
        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(SynthesisError::failed(
                "synthesis-error",
                format!(
                    "{} failed: {}",
                    self.engine.as_str(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }

    async fn play(&self, unit: &str, wav_path: &Path) -> Result<(), SynthesisError> {
        let status = match (&self.player, self.engine) {
            (Some(bin), _) => Command::new(bin)
                .args(player_args(bin, wav_path))
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status()
                .await
                .map_err(spawn_error)?,
            (None, Engine::Espeak) => {
                // espeak-ng plays through its own audio output
                let Some(bin) = self.cfg.espeak_bin.as_ref() else {
                    return Err(SynthesisError::failed("unsupported", "espeak-ng not found"));
                };
                Command::new(bin)
                    .args(espeak_args(&self.cfg, unit, None))
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await
                    .map_err(spawn_error)?
            }
            (None, _) => {
                info!(target: "tts", path = ?wav_path, "No audio player found; kept WAV on disk");
                return Ok(());
            }
        };
        if !status.success() {
            return Err(SynthesisError::failed(
                "playback-error",
                format!("player exited with {}", status),
            ));
        }
        Ok(())
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Temporary WAV removed when the unit is over, however it ends.
struct TempWav(PathBuf);

impl Drop for TempWav {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "tts", path = ?self.0, error = %e, "Failed to remove temporary WAV"),
        }
    }
}

#[async_trait]
impl SynthesisBackend for CliSynthesisBackend {
    fn name(&self) -> &str {
        self.engine.as_str()
    }

    fn is_supported(&self) -> bool {
        self.engine != Engine::None
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    async fn speak(&self, unit: &str) -> Result<(), SynthesisError> {
        if self.engine == Engine::None {
            return Err(SynthesisError::failed("unsupported", "no TTS engine"));
        }
        self.busy.store(true, Ordering::SeqCst);
        let _busy = BusyGuard(&self.busy);

        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);

        let t0 = Instant::now();
        let direct = self.player.is_none() && self.engine == Engine::Espeak;
        let wav_path = self.cfg.temp_dir.join(format!("narrate_{}.wav", gen_id()));
        // Without a player the Piper output is the only result and stays on disk
        let _wav = self.player.is_some().then(|| TempWav(wav_path.clone()));

        if !direct {
            tokio::select! {
                res = self.synthesize(unit, &wav_path) => res?,
                _ = &mut cancelled => return Err(SynthesisError::Interrupted),
            }
        }
        let synthesis_ms = t0.elapsed().as_millis();

        let played = tokio::select! {
            res = self.play(unit, &wav_path) => res,
            _ = &mut cancelled => Err(SynthesisError::Interrupted),
        };
        debug!(
            target: "tts",
            engine = self.engine.as_str(),
            synthesis_ms,
            total_ms = t0.elapsed().as_millis(),
            ok = played.is_ok(),
            "Unit done"
        );
        played
    }

    fn cancel_all(&self) {
        debug!(target: "tts", "Cancelling speech");
        self.cancel.notify_waiters();
    }
}

fn spawn_error(err: std::io::Error) -> SynthesisError {
    SynthesisError::failed("spawn-error", err.to_string())
}

fn resolve_piper_voice_path(cfg: &CliBackendConfig) -> Option<PathBuf> {
    if let Some(v) = &cfg.piper_voice {
        return Some(v.clone());
    }
    if cfg.voice.is_empty() {
        return None;
    }
    let vh = PathBuf::from(&cfg.voice);
    if vh.exists() {
        return Some(vh);
    }
    if let Some(dir) = &cfg.piper_voice_dir {
        let candidate = dir.join(&cfg.voice);
        if candidate.exists() {
            return Some(candidate);
        }
        for ext in ["onnx", "onnx.gz", "pt", "pth"].iter() {
            let c = dir.join(format!("{}.{}", cfg.voice, ext));
            if c.exists() {
                return Some(c);
            }
        }
    }
    None
}

fn piper_args(cfg: &CliBackendConfig, voice_path: &Path, out_wav: &Path) -> Vec<OsString> {
    let length_scale = (1.0f32 / cfg.rate.clamp(0.5, 2.0)).clamp(0.5, 2.0);
    vec![
        "-m".into(),
        voice_path.into(),
        "-f".into(),
        out_wav.into(),
        "--length_scale".into(),
        format!("{:.2}", length_scale).into(),
        "--sample_rate".into(),
        cfg.sample_rate.to_string().into(),
    ]
}

fn espeak_args(cfg: &CliBackendConfig, text: &str, out_wav: Option<&Path>) -> Vec<OsString> {
    let wpm = (160.0 * cfg.rate.clamp(0.5, 2.0)).round().clamp(80.0, 450.0) as i32;
    let amp = (100.0 * cfg.volume.clamp(0.5, 2.0)).round().clamp(50.0, 200.0) as i32;
    let mut args: Vec<OsString> = Vec::new();
    if !cfg.voice.is_empty() {
        args.push("-v".into());
        args.push(cfg.voice.clone().into());
    }
    args.push("-s".into());
    args.push(wpm.to_string().into());
    args.push("-a".into());
    args.push(amp.to_string().into());
    if let Some(out) = out_wav {
        args.push("-w".into());
        args.push(out.into());
    }
    args.push("--".into());
    args.push(text.into());
    args
}

fn player_args(player_bin: &Path, wav_path: &Path) -> Vec<OsString> {
    let name = player_bin
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    match name {
        "ffplay" => vec![
            "-autoexit".into(),
            "-nodisp".into(),
            "-loglevel".into(),
            "quiet".into(),
            wav_path.into(),
        ],
        _ => vec![wav_path.into()],
    }
}

fn select_player(pref: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = pref.and_then(get_from_path) {
        return Some(p);
    }
    get_from_path("aplay")
        .or_else(|| get_from_path("paplay"))
        .or_else(|| get_from_path("ffplay"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("narrate_tts_{}_{}", tag, gen_id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes `-w <path>` like espeak-ng would.
    #[cfg(unix)]
    const FAKE_ESPEAK: &str = "#!/bin/sh
while [ $# -gt 0 ]; do
  if [ \"$1\" = \"-w\" ]; then shift; printf RIFF > \"$1\"; fi
  shift
done
exit 0
";

    // Tests that write and exec scripts run one at a time (ETXTBSY)
    #[cfg(unix)]
    static SCRIPTED: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn wav_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().map(|x| x == "wav").unwrap_or(false))
            .collect()
    }

    #[cfg(unix)]
    fn scripted_backend(tag: &str, espeak: &str, player: &str) -> (CliSynthesisBackend, PathBuf) {
        let dir = scratch_dir(tag);
        let wav_dir = dir.join("wav");
        std::fs::create_dir_all(&wav_dir).unwrap();
        let mut cfg = CliBackendConfig::default();
        cfg.temp_dir = wav_dir.clone();
        cfg.espeak_bin = Some(write_script(&dir, "fake-espeak", espeak));
        cfg.player = Some(
            write_script(&dir, "fake-player", player)
                .to_string_lossy()
                .into_owned(),
        );
        (CliSynthesisBackend::new(cfg), wav_dir)
    }

    #[test]
    fn test_temp_wav_removed_on_drop() {
        let dir = scratch_dir("guard");
        let path = dir.join("unit.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        drop(TempWav(path.clone()));
        assert!(!path.exists());
        // Missing file is fine
        drop(TempWav(path));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_speak_leaves_no_wav() {
        let _serial = SCRIPTED.lock().await;
        let (backend, wav_dir) =
            scripted_backend("dropped", FAKE_ESPEAK, "#!/bin/sh\nexec sleep 30\n");
        assert_eq!(backend.engine(), Engine::Espeak);

        let mut speak = backend.speak("Hello there.");
        let playing = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            loop {
                tokio::select! {
                    _ = &mut speak => return false,
                    _ = tokio::time::sleep(std::time::Duration::from_millis(20)) => {
                        if !wav_files(&wav_dir).is_empty() {
                            return true;
                        }
                    }
                }
            }
        })
        .await;
        assert_eq!(playing, Ok(true));

        // Aborted narration or watchdog timeout: the future is just dropped
        drop(speak);
        assert!(wav_files(&wav_dir).is_empty());
        assert!(!backend.is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_synthesis_leaves_no_wav() {
        let _serial = SCRIPTED.lock().await;
        let script = FAKE_ESPEAK.replace("exit 0", "exit 3");
        let (backend, wav_dir) = scripted_backend("failed", &script, "#!/bin/sh\nexit 0\n");

        let err = backend.speak("Hello there.").await.unwrap_err();
        assert_eq!(err.kind(), "synthesis-error");
        assert!(wav_files(&wav_dir).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_played_unit_leaves_no_wav() {
        let _serial = SCRIPTED.lock().await;
        let (backend, wav_dir) = scripted_backend("played", FAKE_ESPEAK, "#!/bin/sh\nexit 0\n");

        backend.speak("Hello there.").await.unwrap();
        assert!(wav_files(&wav_dir).is_empty());
    }

    #[test]
    fn test_no_engine_is_unsupported() {
        let backend = CliSynthesisBackend::new(CliBackendConfig::default());
        assert_eq!(backend.engine(), Engine::None);
        assert!(!backend.is_supported());
        assert!(!backend.is_busy());
        assert_eq!(backend.name(), "none");
    }

    #[tokio::test]
    async fn test_speak_without_engine_fails() {
        let backend = CliSynthesisBackend::new(CliBackendConfig::default());
        let err = backend.speak("hello").await.unwrap_err();
        assert_eq!(err.kind(), "unsupported");
        assert!(!backend.is_busy());
    }

    #[test]
    fn test_piper_requires_voice() {
        let mut cfg = CliBackendConfig::default();
        cfg.piper_bin = Some(PathBuf::from("/usr/bin/piper"));
        assert_eq!(select_engine(&cfg), Engine::None);

        cfg.espeak_bin = Some(PathBuf::from("/usr/bin/espeak-ng"));
        assert_eq!(select_engine(&cfg), Engine::Espeak);

        cfg.piper_voice = Some(PathBuf::from("/voices/en_US-amy.onnx"));
        assert_eq!(select_engine(&cfg), Engine::Piper);
    }

    #[test]
    fn test_piper_voice_resolved_from_dir() {
        let dir = scratch_dir("voices");
        std::fs::write(dir.join("en_GB-alan.onnx"), b"model").unwrap();

        let mut cfg = CliBackendConfig::default();
        cfg.voice = "en_GB-alan".into();
        cfg.piper_voice_dir = Some(dir.clone());
        assert_eq!(
            resolve_piper_voice_path(&cfg),
            Some(dir.join("en_GB-alan.onnx"))
        );

        cfg.voice = "missing".into();
        assert_eq!(resolve_piper_voice_path(&cfg), None);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_espeak_args_are_clamped() {
        let mut cfg = CliBackendConfig::default();
        cfg.rate = 5.0;
        cfg.volume = 0.1;
        cfg.voice = "en-us".into();
        let args = espeak_args(&cfg, "Hi there.", Some(Path::new("/tmp/out.wav")));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-v", "en-us", "-s", "320", "-a", "50", "-w", "/tmp/out.wav", "--", "Hi there."]
        );
    }

    #[test]
    fn test_espeak_direct_args_have_no_wav() {
        let cfg = CliBackendConfig::default();
        let args = espeak_args(&cfg, "-dash first", None);
        assert!(!args.iter().any(|a| a == "-w"));
        assert_eq!(args.last().map(|a| a.to_string_lossy().into_owned()), Some("-dash first".into()));
    }

    #[test]
    fn test_piper_length_scale_follows_rate() {
        let mut cfg = CliBackendConfig::default();
        cfg.rate = 2.0;
        let args = piper_args(&cfg, Path::new("v.onnx"), Path::new("o.wav"));
        let pos = args.iter().position(|a| a == "--length_scale").unwrap();
        assert_eq!(args[pos + 1], "0.50");
    }

    #[test]
    fn test_ffplay_gets_headless_flags() {
        let args = player_args(Path::new("/usr/bin/ffplay"), Path::new("a.wav"));
        assert_eq!(args[0], "-autoexit");
        assert_eq!(args.last().map(|a| a.as_os_str()), Some(Path::new("a.wav").as_os_str()));
        let args = player_args(Path::new("/usr/bin/aplay"), Path::new("a.wav"));
        assert_eq!(args.len(), 1);
    }
}
