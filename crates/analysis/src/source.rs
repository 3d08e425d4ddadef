//! 분석 입력 소스 -- 업로드 바이너리 또는 원격 저장소
//!
//! 바이너리 내용은 API에서 base64로 전달되며 [`AnalysisSource::binary_from_base64`]에서
//! 디코딩합니다. 저장소 접근 토큰은 `Debug` 출력에 노출되지 않습니다.

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ecuscan_core::error::AnalysisError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 텍스트로 취급하는 확장자
pub const TEXT_EXTENSIONS: [&str; 8] = [
    ".c", ".h", ".cpp", ".hpp", ".arxml", ".xml", ".txt", ".json",
];

/// 텍스트 미리보기 최대 바이트
const PREVIEW_TEXT_BYTES: usize = 512;

/// 16진 미리보기 바이트 수
const PREVIEW_HEX_BYTES: usize = 64;

/// 저장소 호스팅 제공자
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitProvider {
    #[default]
    Github,
    Gitlab,
}

impl GitProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
        }
    }
}

/// 원격 저장소 참조
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default)]
    pub provider: GitProvider,
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
}

fn default_branch() -> String {
    "main".to_owned()
}

impl RepositoryRef {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            provider: GitProvider::default(),
            access_token: None,
        }
    }

    /// URL에서 `owner/repo`를 추출합니다.
    ///
    /// 끝의 `/`와 `.git`을 제거한 뒤 마지막 두 경로 조각을 사용합니다.
    /// 조각이 부족하면 `"unknown"`입니다.
    pub fn slug(&self) -> String {
        let trimmed = self.url.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut parts = trimmed
            .rsplit('/')
            .filter(|p| !p.is_empty() && !p.contains(':'));
        match (parts.next(), parts.next()) {
            (Some(repo), Some(owner)) => format!("{owner}/{repo}"),
            _ => "unknown".to_owned(),
        }
    }
}

impl fmt::Debug for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryRef")
            .field("url", &self.url)
            .field("branch", &self.branch)
            .field("provider", &self.provider)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// 분석 대상
#[derive(Clone, PartialEq, Eq)]
pub enum AnalysisSource {
    /// 업로드된 펌웨어 이미지 또는 소스 파일
    Binary { file_name: String, content: Vec<u8> },
    /// 원격 저장소
    Repository(RepositoryRef),
}

impl AnalysisSource {
    /// base64 페이로드를 디코딩하여 바이너리 소스를 만듭니다.
    ///
    /// 줄바꿈 등 공백은 무시합니다.
    pub fn binary_from_base64(
        file_name: impl Into<String>,
        encoded: &str,
    ) -> Result<Self, AnalysisError> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let content = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| AnalysisError::InvalidSource(format!("content is not valid base64: {e}")))?;
        Ok(Self::Binary {
            file_name: file_name.into(),
            content,
        })
    }

    /// 소스 종류 (`binary`, `repository`)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Binary { .. } => "binary",
            Self::Repository(_) => "repository",
        }
    }

    /// parsing 단계 로그에 남기는 설명
    pub fn describe(&self) -> String {
        match self {
            Self::Binary { file_name, content } => {
                format!("Processing file: {file_name} ({} bytes)", content.len())
            }
            Self::Repository(repo) => {
                format!("Starting analysis of {} ({})", repo.slug(), repo.branch)
            }
        }
    }
}

impl fmt::Debug for AnalysisSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary { file_name, content } => f
                .debug_struct("Binary")
                .field("file_name", file_name)
                .field("len", &content.len())
                .finish(),
            Self::Repository(repo) => f.debug_tuple("Repository").field(repo).finish(),
        }
    }
}

/// 확장자로 텍스트 파일 여부를 판단합니다 (대소문자 무시).
pub fn is_text_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    TEXT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// 내용의 SHA-256 (소문자 hex)
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// 디버그 로그용 미리보기. 텍스트는 앞부분 문자열, 그 외는 16진 바이트.
pub fn preview(file_name: &str, content: &[u8]) -> String {
    if is_text_file(file_name) {
        let end = content.len().min(PREVIEW_TEXT_BYTES);
        String::from_utf8_lossy(&content[..end]).into_owned()
    } else {
        content
            .iter()
            .take(PREVIEW_HEX_BYTES)
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
