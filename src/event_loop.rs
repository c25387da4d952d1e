use std::io;
use std::time::Duration;

use crossterm::event::Event;

/// Where terminal events come from. The real implementation wraps crossterm;
/// tests script one.
pub trait InputSource {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;
    fn read(&mut self) -> io::Result<Event>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrosstermInput;

impl InputSource for CrosstermInput {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        crossterm::event::poll(timeout)
    }

    fn read(&mut self) -> io::Result<Event> {
        crossterm::event::read()
    }
}

pub enum ControlFlow {
    Continue,
    Quit,
}

/// Single-threaded pump for the inspector UI. Engine work runs on the tokio
/// runtime; this loop only polls input and redraws.
pub struct EventLoop<S> {
    source: S,
    poll_interval: Duration,
}

impl<S: InputSource> EventLoop<S> {
    pub fn new(source: S, poll_interval: Duration) -> Self {
        Self {
            source,
            poll_interval,
        }
    }

    /// `handler` gets `None` on every tick (redraw) and `Some(event)` per
    /// input event.
    pub fn run<F>(&mut self, mut handler: F) -> io::Result<()>
    where
        F: FnMut(Option<Event>) -> io::Result<ControlFlow>,
    {
        loop {
            if let ControlFlow::Quit = handler(None)? {
                break;
            }

            if self.source.poll(self.poll_interval)? {
                // Drain bursts so key repeat does not lag behind redraws.
                loop {
                    let event = self.source.read()?;
                    if let ControlFlow::Quit = handler(Some(event))? {
                        return Ok(());
                    }
                    if !self.source.poll(Duration::from_millis(0))? {
                        break;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Event>);

    impl InputSource for Scripted {
        fn poll(&mut self, _timeout: Duration) -> io::Result<bool> {
            Ok(!self.0.is_empty())
        }

        fn read(&mut self) -> io::Result<Event> {
            self.0
                .pop_front()
                .ok_or_else(|| io::Error::other("script exhausted"))
        }
    }

    fn key(c: char) -> Event {
        Event::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
    }

    #[test]
    fn drains_queued_events_before_next_tick() {
        let script = Scripted(VecDeque::from(vec![key('a'), key('b'), key('q')]));
        let mut lp = EventLoop::new(script, Duration::from_millis(1));
        let mut seen = Vec::new();
        let mut ticks = 0;
        lp.run(|event| {
            match event {
                None => ticks += 1,
                Some(Event::Key(k)) if k.code == KeyCode::Char('q') => return Ok(ControlFlow::Quit),
                Some(Event::Key(k)) => seen.push(k.code),
                Some(_) => {}
            }
            Ok(ControlFlow::Continue)
        })
        .unwrap();
        assert_eq!(seen, vec![KeyCode::Char('a'), KeyCode::Char('b')]);
        assert_eq!(ticks, 1);
    }

    #[test]
    fn tick_handler_can_quit() {
        let mut lp = EventLoop::new(Scripted(VecDeque::new()), Duration::from_millis(1));
        let mut ticks = 0;
        lp.run(|_| {
            ticks += 1;
            Ok(if ticks == 3 {
                ControlFlow::Quit
            } else {
                ControlFlow::Continue
            })
        })
        .unwrap();
        assert_eq!(ticks, 3);
    }
}
