//! Artifact generation: images, speech and scripts written to disk.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::chatbot::error::BridgeError;
use crate::chatbot::tools::ToolCall;
use crate::openai::{self, Record};

const SCRIPT_INSTRUCTION: &str = "Only respond with the generated code, formatted for a .py file.";

/// Produces artifact files from prompts.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn image(&self, prompt: &str) -> Result<PathBuf, BridgeError>;
    async fn speech(&self, prompt: &str) -> Result<PathBuf, BridgeError>;
    async fn script(&self, prompt: &str) -> Result<PathBuf, BridgeError>;
}

/// Run a parsed tool call and return the artifact path.
pub async fn dispatch(generator: &dyn Generator, call: &ToolCall) -> Result<PathBuf, BridgeError> {
    match call {
        ToolCall::GenerateImage { prompt } => generator.image(prompt).await,
        ToolCall::CreateScript { prompt } => generator.script(prompt).await,
        ToolCall::CreateVoiceMessage { prompt } => generator.speech(prompt).await,
    }
}

/// Directory artifacts are written to, named by a strftime pattern.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
    name_format: String,
}

impl ArtifactDir {
    pub fn new(root: impl Into<PathBuf>, name_format: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name_format: name_format.into(),
        }
    }

    /// Claim a fresh file for a new artifact with extension `ext`.
    ///
    /// The name is the current local time formatted with the configured
    /// pattern. If that file already exists a `-N` suffix is added. The file
    /// is created here, so two callers never get the same path.
    pub async fn allocate(&self, ext: &str) -> std::io::Result<(PathBuf, File)> {
        let stamp = chrono::Local::now().format(&self.name_format).to_string();
        self.allocate_named(&stamp, ext).await
    }

    async fn allocate_named(&self, stamp: &str, ext: &str) -> std::io::Result<(PathBuf, File)> {
        tokio::fs::create_dir_all(&self.root).await?;

        let mut n = 0;
        loop {
            let name = match n {
                0 => format!("{stamp}.{ext}"),
                n => format!("{stamp}-{n}.{ext}"),
            };
            let path = self.root.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Write `body` into a newly claimed file. A body that fails midway
    /// leaves no file behind.
    async fn save<S: ChunkSource>(&self, ext: &str, mut body: S) -> Result<(PathBuf, u64), BridgeError> {
        let (path, mut file) = self.allocate(ext).await?;
        match write_chunks(&mut body, &mut file).await {
            Ok(bytes) => Ok((path, bytes)),
            Err(e) => {
                drop(file);
                if let Err(remove) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial {}: {remove}", path.display());
                }
                Err(e)
            }
        }
    }
}

/// Model choices for the generation calls.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub image_model: String,
    pub image_quality: String,
    pub speech_model: String,
    pub voice: String,
    pub script_model: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            image_model: "dall-e-3".to_string(),
            image_quality: "hd".to_string(),
            speech_model: "tts-1-hd".to_string(),
            voice: "nova".to_string(),
            script_model: "gpt-4-1106-preview".to_string(),
        }
    }
}

/// Generator backed by the OpenAI API.
pub struct OpenAiGenerator {
    client: Arc<openai::Client>,
    dir: ArtifactDir,
    settings: GenerationSettings,
}

impl OpenAiGenerator {
    pub fn new(client: Arc<openai::Client>, dir: ArtifactDir, settings: GenerationSettings) -> Self {
        Self { client, dir, settings }
    }
}

/// A body delivered piece by piece.
#[async_trait]
trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BridgeError>;
}

#[async_trait]
impl ChunkSource for reqwest::Response {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        let chunk = self.chunk().await.map_err(openai::Error::from)?;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

/// A body already held in memory, yielded as a single chunk.
#[async_trait]
impl ChunkSource for Option<Vec<u8>> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
        Ok(self.take())
    }
}

async fn write_chunks<S: ChunkSource>(body: &mut S, file: &mut File) -> Result<u64, BridgeError> {
    let mut written = 0u64;
    while let Some(chunk) = body.next_chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn image(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
        info!("🎨 Generating image: {}", prompt);
        let url = self
            .client
            .generate_image(&self.settings.image_model, &self.settings.image_quality, prompt)
            .await?;
        debug!("Image URL: {url}");

        let response = self.client.download(&url).await?;
        let (path, bytes) = self.dir.save("jpg", response).await?;

        info!("🎨 Image saved to {} ({} bytes)", path.display(), bytes);
        Ok(path)
    }

    async fn speech(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
        let preview: String = prompt.chars().take(50).collect();
        info!("🔊 TTS: \"{}\"", preview);

        let response = self
            .client
            .speech(&self.settings.speech_model, &self.settings.voice, prompt)
            .await?;
        let (path, bytes) = self.dir.save("mp3", response).await?;

        info!("🔊 Voice saved to {} ({} bytes)", path.display(), bytes);
        Ok(path)
    }

    async fn script(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
        info!("📝 Generating script: {}", prompt);
        let records = [Record::system(SCRIPT_INSTRUCTION), Record::user(prompt)];
        let reply = self
            .client
            .chat_with_model(&self.settings.script_model, &records, None)
            .await?;
        let code = strip_code_fence(reply.content.as_deref().unwrap_or_default());

        let (path, bytes) = self.dir.save("py", Some(code.as_bytes().to_vec())).await?;

        info!("📝 Script saved to {} ({} bytes)", path.display(), bytes);
        Ok(path)
    }
}

/// Remove one Markdown code fence wrapping the whole text, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. "python") on the opening line.
    match body.split_once('\n') {
        Some((_, code)) => code.trim_end_matches('\n'),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_allocate_uses_format_and_extension() {
        let tmp = TempDir::new().unwrap();
        let dir = ArtifactDir::new(tmp.path(), "%Y");
        let (path, _file) = dir.allocate("jpg").await.unwrap();

        let expected = format!("{}.jpg", chrono::Local::now().format("%Y"));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), expected);
        assert_eq!(path.parent().unwrap(), tmp.path());
        // The name is claimed on disk straight away.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_allocate_creates_root() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("nested").join("files");
        let dir = ArtifactDir::new(&root, "%Y%m%d%H%M%S");
        dir.allocate("mp3").await.unwrap();
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_allocate_adds_suffix_on_collision() {
        let tmp = TempDir::new().unwrap();
        let dir = ArtifactDir::new(tmp.path(), "unused");

        let (first, _) = dir.allocate_named("20240101120000", "py").await.unwrap();
        assert!(first.ends_with("20240101120000.py"));
        let (second, _) = dir.allocate_named("20240101120000", "py").await.unwrap();
        assert!(second.ends_with("20240101120000-1.py"));
        let (third, _) = dir.allocate_named("20240101120000", "py").await.unwrap();
        assert!(third.ends_with("20240101120000-2.py"));

        // Other extensions do not collide.
        let (other, _) = dir.allocate_named("20240101120000", "mp3").await.unwrap();
        assert!(other.ends_with("20240101120000.mp3"));
    }

    #[tokio::test]
    async fn test_allocate_twice_without_writing_gives_distinct_paths() {
        let tmp = TempDir::new().unwrap();
        let dir = ArtifactDir::new(tmp.path(), "fixed");

        let (a, _) = dir.allocate("jpg").await.unwrap();
        let (b, _) = dir.allocate("jpg").await.unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with("fixed.jpg"));
        assert!(b.ends_with("fixed-1.jpg"));
    }

    #[tokio::test]
    async fn test_concurrent_allocations_never_share_a_path() {
        let tmp = TempDir::new().unwrap();
        let dir = Arc::new(ArtifactDir::new(tmp.path(), "fixed"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.clone();
                tokio::spawn(async move { dir.allocate("mp3").await.unwrap().0 })
            })
            .collect();
        let mut paths = Vec::new();
        for handle in handles {
            paths.push(handle.await.unwrap());
        }
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 8);
    }

    #[tokio::test]
    async fn test_save_writes_body() {
        let tmp = TempDir::new().unwrap();
        let dir = ArtifactDir::new(tmp.path(), "fixed");

        let (path, bytes) = dir.save("py", Some(b"print(1)".to_vec())).await.unwrap();
        assert_eq!(bytes, 8);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "print(1)");
    }

    /// Yields one chunk, then fails like a dropped connection.
    struct BrokenBody {
        sent: bool,
    }

    #[async_trait]
    impl ChunkSource for BrokenBody {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, BridgeError> {
            if self.sent {
                return Err(std::io::Error::from(std::io::ErrorKind::ConnectionReset).into());
            }
            self.sent = true;
            Ok(Some(vec![0xff; 16]))
        }
    }

    #[tokio::test]
    async fn test_failed_body_leaves_no_file() {
        let tmp = TempDir::new().unwrap();
        let dir = ArtifactDir::new(tmp.path(), "fixed");

        let result = dir.save("mp3", BrokenBody { sent: false }).await;

        assert!(matches!(result, Err(BridgeError::Io(_))));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("print(1)"), "print(1)");
        assert_eq!(strip_code_fence("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fence("```\nx = 1\ny = 2\n```\n"), "x = 1\ny = 2");
        assert_eq!(strip_code_fence("```print(1)```"), "print(1)");
        // Unterminated fence is left alone.
        assert_eq!(strip_code_fence("```python\nprint(1)"), "```python\nprint(1)");
    }

    struct Recording;

    #[async_trait]
    impl Generator for Recording {
        async fn image(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
            Ok(PathBuf::from(format!("image:{prompt}")))
        }
        async fn speech(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
            Ok(PathBuf::from(format!("speech:{prompt}")))
        }
        async fn script(&self, prompt: &str) -> Result<PathBuf, BridgeError> {
            Ok(PathBuf::from(format!("script:{prompt}")))
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_variant() {
        let g = Recording;
        let image = dispatch(&g, &ToolCall::GenerateImage { prompt: "cat".to_string() }).await.unwrap();
        let script = dispatch(&g, &ToolCall::CreateScript { prompt: "fib".to_string() }).await.unwrap();
        let voice = dispatch(&g, &ToolCall::CreateVoiceMessage { prompt: "hi".to_string() }).await.unwrap();
        assert_eq!(image, PathBuf::from("image:cat"));
        assert_eq!(script, PathBuf::from("script:fib"));
        assert_eq!(voice, PathBuf::from("speech:hi"));
    }
}
