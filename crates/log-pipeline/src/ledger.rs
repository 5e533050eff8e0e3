//! 중복 제거 원장
//!
//! 한 번 수락된 alert_id를 영구히 기록합니다. 원장은 추가 전용이며
//! 만료나 정리 정책이 없습니다.
//!
//! [`DedupLedger::check_and_insert`]는 확인과 기록을 하나의 원자적 연산으로
//! 수행합니다. 동시에 평가되는 두 메시지가 같은 id를 모두 수락할 수 없습니다.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::error::LogPipelineError;

/// 중복 제거 원장 인터페이스
pub trait DedupLedger: Send + Sync {
    /// id가 이미 기록되어 있는지 확인합니다.
    fn contains(&self, id: &str) -> Result<bool, LogPipelineError>;

    /// id를 기록합니다. 이미 있으면 아무 일도 하지 않습니다.
    fn append(&self, id: &str) -> Result<(), LogPipelineError>;

    /// id가 없으면 기록하고 `true`를, 이미 있으면 `false`를 반환합니다.
    fn check_and_insert(&self, id: &str) -> Result<bool, LogPipelineError>;

    /// 기록된 id 수
    fn len(&self) -> usize;

    /// 비어 있는지 확인합니다.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 파일 기반 원장
///
/// 한 줄에 id 하나를 쓰는 텍스트 파일입니다. 열 때 전체를 메모리 집합으로
/// 읽고, 이후 쓰기는 append + flush + sync_data 후에 집합에 반영합니다.
pub struct FileLedger {
    path: PathBuf,
    inner: Mutex<LedgerState>,
}

struct LedgerState {
    ids: HashSet<String>,
    file: File,
}

impl FileLedger {
    /// 원장 파일을 열고 기존 id를 로드합니다.
    ///
    /// 상위 디렉토리가 없으면 생성합니다. 잘못된 UTF-8은 대체 문자로 읽습니다.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogPipelineError> {
        let path = path.as_ref().to_path_buf();
        let ledger_err = |e: std::io::Error| LogPipelineError::Ledger {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ledger_err)?;
        }

        let ids: HashSet<String> = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(ledger_err(e)),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(ledger_err)?;

        info!(path = %path.display(), entries = ids.len(), "opened dedup ledger");

        Ok(Self {
            path,
            inner: Mutex::new(LedgerState { ids, file }),
        })
    }

    /// 원장 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>, LogPipelineError> {
        self.inner.lock().map_err(|_| self.err("ledger lock poisoned"))
    }

    fn err(&self, reason: impl Into<String>) -> LogPipelineError {
        LogPipelineError::Ledger {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    /// 잠금을 잡은 상태에서 id를 파일에 쓰고 집합에 반영합니다.
    fn write_locked(&self, state: &mut LedgerState, id: &str) -> Result<(), LogPipelineError> {
        if id.contains(['\n', '\r']) {
            return Err(self.err("ledger id must not contain line breaks"));
        }

        state
            .file
            .write_all(format!("{id}\n").as_bytes())
            .and_then(|()| state.file.flush())
            .and_then(|()| state.file.sync_data())
            .map_err(|e| self.err(format!("failed to append: {e}")))?;

        state.ids.insert(id.to_owned());
        debug!(alert_id = id, "recorded alert id in ledger");
        Ok(())
    }
}

impl DedupLedger for FileLedger {
    fn contains(&self, id: &str) -> Result<bool, LogPipelineError> {
        Ok(self.lock()?.ids.contains(id))
    }

    fn append(&self, id: &str) -> Result<(), LogPipelineError> {
        let mut state = self.lock()?;
        if state.ids.contains(id) {
            return Ok(());
        }
        self.write_locked(&mut state, id)
    }

    fn check_and_insert(&self, id: &str) -> Result<bool, LogPipelineError> {
        let mut state = self.lock()?;
        if state.ids.contains(id) {
            return Ok(false);
        }
        self.write_locked(&mut state, id)?;
        Ok(true)
    }

    fn len(&self) -> usize {
        self.inner.lock().map(|state| state.ids.len()).unwrap_or(0)
    }
}

/// 메모리 원장
///
/// 프로세스가 끝나면 내용이 사라집니다. 테스트와 임시 실행용입니다.
#[derive(Default)]
pub struct MemoryLedger {
    ids: Mutex<HashSet<String>>,
}

impl MemoryLedger {
    /// 빈 원장을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashSet<String>>, LogPipelineError> {
        self.ids.lock().map_err(|_| LogPipelineError::Ledger {
            path: "<memory>".to_owned(),
            reason: "ledger lock poisoned".to_owned(),
        })
    }
}

impl DedupLedger for MemoryLedger {
    fn contains(&self, id: &str) -> Result<bool, LogPipelineError> {
        Ok(self.lock()?.contains(id))
    }

    fn append(&self, id: &str) -> Result<(), LogPipelineError> {
        self.lock()?.insert(id.to_owned());
        Ok(())
    }

    fn check_and_insert(&self, id: &str) -> Result<bool, LogPipelineError> {
        Ok(self.lock()?.insert(id.to_owned()))
    }

    fn len(&self) -> usize {
        self.ids.lock().map(|ids| ids.len()).unwrap_or(0)
    }
}
