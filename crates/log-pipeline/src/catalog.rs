//! 작업 메타데이터 카탈로그
//!
//! 작업 이름으로 담당 그룹과 숫자 심각도를 조회합니다. 조회 실패와 미등록
//! 작업은 호출자가 모두 "알 수 없는 작업"으로 취급합니다.
//!
//! ```json
//! [
//!   { "job_name": "KMWHD001", "group_code": "G-DWH-01", "group_name": "DWH Ops", "severity": 4 }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::LogPipelineError;

/// 카탈로그 문서 최대 크기
const MAX_CATALOG_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50MB

/// 작업 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// 담당 그룹 코드
    #[serde(default)]
    pub group_code: Option<String>,
    /// 담당 그룹 이름
    #[serde(default)]
    pub group_name: Option<String>,
    /// 숫자 심각도
    #[serde(default, deserialize_with = "lenient_severity")]
    pub severity: Option<i64>,
}

/// 작업 카탈로그 인터페이스
pub trait JobCatalog: Send + Sync {
    /// 작업 이름으로 메타데이터를 조회합니다. 미등록 작업은 `Ok(None)`입니다.
    fn lookup(&self, job_name: &str) -> Result<Option<JobMetadata>, LogPipelineError>;
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    job_name: String,
    #[serde(flatten)]
    metadata: JobMetadata,
}

/// JSON 파일에서 읽은 카탈로그
///
/// 키는 앞뒤 공백을 제거해 저장하며 조회는 대소문자를 구분하는 정확 일치입니다.
#[derive(Debug, Clone, Default)]
pub struct FileJobCatalog {
    jobs: HashMap<String, JobMetadata>,
}

impl FileJobCatalog {
    /// JSON 배열에서 카탈로그를 생성합니다. 같은 작업이 반복되면 뒤의 것이 이깁니다.
    pub fn from_json(json: &str) -> Result<Self, LogPipelineError> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        let jobs = entries
            .into_iter()
            .filter_map(|entry| {
                let name = entry.job_name.trim();
                (!name.is_empty()).then(|| (name.to_owned(), entry.metadata))
            })
            .collect();
        Ok(Self { jobs })
    }

    /// 파일에서 카탈로그를 로드합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let path = path.as_ref();
        let lookup_err =
            |reason: String| LogPipelineError::JobLookup(format!("{}: {reason}", path.display()));

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| lookup_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > MAX_CATALOG_FILE_SIZE {
            return Err(lookup_err(format!(
                "file too large: {} bytes (max: {MAX_CATALOG_FILE_SIZE})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| lookup_err(format!("failed to read file: {e}")))?;
        let catalog = Self::from_json(&content).map_err(|e| lookup_err(e.to_string()))?;

        tracing::info!(path = %path.display(), jobs = catalog.len(), "loaded job catalog");
        Ok(catalog)
    }

    /// 등록된 작업 수
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobCatalog for FileJobCatalog {
    fn lookup(&self, job_name: &str) -> Result<Option<JobMetadata>, LogPipelineError> {
        Ok(self.jobs.get(job_name).cloned())
    }
}

/// 모든 작업을 미등록으로 응답하는 카탈로그
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyJobCatalog;

impl JobCatalog for EmptyJobCatalog {
    fn lookup(&self, _job_name: &str) -> Result<Option<JobMetadata>, LogPipelineError> {
        Ok(None)
    }
}

/// 숫자 또는 숫자 문자열을 심각도로 읽습니다. 그 밖의 값은 미지정입니다.
fn lenient_severity<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
