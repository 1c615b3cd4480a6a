use std::fmt;
use thiserror::Error;

/// 协作者错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaboratorErrorKind {
    Io,
    Timeout,
    Other,
}

impl fmt::Display for CollaboratorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollaboratorErrorKind::Io => "io",
            CollaboratorErrorKind::Timeout => "timeout",
            CollaboratorErrorKind::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// 工作流执行失败
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("已有工作流正在执行")]
    Busy,

    #[error("检测失败: {0}")]
    DetectionFailed(String),

    #[error("协作者调用失败 ({kind}): {message}")]
    Collaborator {
        kind: CollaboratorErrorKind,
        message: String,
    },

    #[error("协作者执行时发生panic: {0}")]
    Panicked(String),
}

impl WorkflowError {
    /// 按错误链中的具体类型对协作者错误分类
    pub fn from_collaborator(error: anyhow::Error) -> Self {
        let kind = error
            .chain()
            .find_map(|cause| {
                if cause.is::<tokio::time::error::Elapsed>() {
                    Some(CollaboratorErrorKind::Timeout)
                } else {
                    cause.downcast_ref::<std::io::Error>().map(|io| {
                        if io.kind() == std::io::ErrorKind::TimedOut {
                            CollaboratorErrorKind::Timeout
                        } else {
                            CollaboratorErrorKind::Io
                        }
                    })
                }
            })
            .unwrap_or(CollaboratorErrorKind::Other);
        WorkflowError::Collaborator {
            kind,
            message: format!("{error:#}"),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, WorkflowError::Busy)
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_classify_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "camera missing");
        let err = WorkflowError::from_collaborator(anyhow::Error::new(io));
        assert!(matches!(
            err,
            WorkflowError::Collaborator {
                kind: CollaboratorErrorKind::Io,
                ..
            }
        ));
    }

    #[test]
    fn test_classify_wrapped_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "no frame");
        let result: anyhow::Result<()> = Err(io).context("capture frame");
        let err = WorkflowError::from_collaborator(result.unwrap_err());
        match err {
            WorkflowError::Collaborator { kind, message } => {
                assert_eq!(kind, CollaboratorErrorKind::Timeout);
                assert!(message.contains("capture frame"));
                assert!(message.contains("no frame"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classify_other() {
        let err = WorkflowError::from_collaborator(anyhow::anyhow!("model not loaded"));
        assert!(matches!(
            err,
            WorkflowError::Collaborator {
                kind: CollaboratorErrorKind::Other,
                ..
            }
        ));
    }
}
