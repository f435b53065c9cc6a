use crate::equation_engine::CompileError;

/// Lifecycle shared by both sessions.
///
/// Compilation is synchronous, so there is no observable "compiling" state: a
/// session goes straight from `Idle` to `Ready` or `CompileError`. Integration
/// never moves a session out of either of those.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Idle,
    Ready,
    CompileError(CompileError),
}

impl SessionState {
    pub fn from_compile<T>(result: &Result<T, CompileError>) -> Self {
        match result {
            Ok(_) => SessionState::Ready,
            Err(err) => SessionState::CompileError(err.clone()),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionState::Idle)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    pub fn error(&self) -> Option<&CompileError> {
        match self {
            SessionState::CompileError(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_compile_results() {
        let ok: Result<(), CompileError> = Ok(());
        assert!(SessionState::from_compile(&ok).is_ready());
        let err: Result<(), CompileError> = Err(CompileError::UnexpectedEnd);
        let state = SessionState::from_compile(&err);
        assert_eq!(state.error(), Some(&CompileError::UnexpectedEnd));
        assert!(SessionState::default().is_idle());
    }
}
