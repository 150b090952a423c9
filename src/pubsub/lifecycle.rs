use std::fmt;

use streamrelay_error::SubscriberError;

/// Состояние жизненного цикла подписчика.
///
/// Переходы только вперёд: `Idle → Listening → Closed` или `Idle → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    Idle,
    Listening,
    Closed,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for State {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Машина состояний подписчика.
///
/// Проверка перехода и его фиксация разделены: `check_start` вызывается до
/// сетевых операций, `mark_listening` после их успеха. Так неудачный
/// `start` оставляет экземпляр в `Idle`.
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: State,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Разрешён ли переход `Idle → Listening`.
    pub fn check_start(&self) -> Result<(), SubscriberError> {
        match self.state {
            State::Idle => Ok(()),
            other => Err(SubscriberError::AlreadyClosed {
                state: other.as_str(),
            }),
        }
    }

    /// Фиксирует переход `Idle → Listening`.
    pub fn mark_listening(&mut self) -> Result<(), SubscriberError> {
        self.check_start()?;
        self.state = State::Listening;
        Ok(())
    }

    /// Переход в `Closed`. Возвращает предыдущее состояние.
    pub fn close(&mut self) -> Result<State, SubscriberError> {
        match self.state {
            State::Closed => Err(SubscriberError::AlreadyClosed {
                state: State::Closed.as_str(),
            }),
            previous => {
                self.state = State::Closed;
                Ok(previous)
            }
        }
    }
}
