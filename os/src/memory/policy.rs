//! 置换策略。
//!
//! 快表与驻留集都要在满员时挑牺牲者，
//! 两处共用同一套策略接口，具体算法从命令行选定。

use std::collections::VecDeque;

/// 被管理的条目用一个不透明编号指代：
/// 快表用槽位下标，驻留集用物理页号。
pub trait ReplacementPolicy: Send {
    /// 新条目进驻
    fn insert(&mut self, token: usize);
    /// 条目被命中
    fn touch(&mut self, token: usize);
    /// 从候选者里挑出牺牲者
    fn victim(&mut self, candidates: &[usize]) -> usize;
    /// 抹掉全部历史
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Fifo,
    Lru,
}

impl PolicyKind {
    pub fn build(self) -> Box<dyn ReplacementPolicy> {
        match self {
            Self::Fifo => Box::new(Fifo::default()),
            Self::Lru => Box::new(Lru::default()),
        }
    }
}

/// 先进先出：一个环形推进的「下一个被换」指针
#[derive(Debug, Default)]
pub struct Fifo {
    next_repl: usize,
}

/// 最久未用：队首最老，新来的与被命中的都挪到队尾
#[derive(Debug, Default)]
pub struct Lru {
    queue: VecDeque<usize>,
}

impl ReplacementPolicy for Fifo {
    fn insert(&mut self, _: usize) {}

    fn touch(&mut self, _: usize) {}

    fn victim(&mut self, candidates: &[usize]) -> usize {
        let victim = candidates[self.next_repl % candidates.len()];
        self.next_repl = (self.next_repl + 1) % candidates.len();
        victim
    }

    fn reset(&mut self) {
        self.next_repl = 0;
    }
}

impl ReplacementPolicy for Lru {
    fn insert(&mut self, token: usize) {
        self.touch(token);
    }

    fn touch(&mut self, token: usize) {
        self.queue.retain(|&t| t != token);
        self.queue.push_back(token);
    }

    fn victim(&mut self, candidates: &[usize]) -> usize {
        while let Some(token) = self.queue.pop_front() {
            if candidates.contains(&token) {
                return token;
            }
        }
        candidates[0]
    }

    fn reset(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_cycles_through_candidates() {
        let mut fifo = Fifo::default();
        let candidates = [0, 1, 2, 3];

        assert_eq!(fifo.victim(&candidates), 0);
        assert_eq!(fifo.victim(&candidates), 1);
        fifo.touch(1); // FIFO 不理会命中
        assert_eq!(fifo.victim(&candidates), 2);
        assert_eq!(fifo.victim(&candidates), 3);
        assert_eq!(fifo.victim(&candidates), 0);

        fifo.reset();
        assert_eq!(fifo.victim(&candidates), 0);
    }

    #[test]
    fn lru_evicts_the_oldest() {
        let mut lru = Lru::default();
        let candidates = [4, 5, 6];
        for token in candidates {
            lru.insert(token);
        }

        lru.touch(4); // 4 变成最新
        assert_eq!(lru.victim(&candidates), 5);

        lru.insert(5);
        lru.touch(6);
        // 队列现在是 4, 5, 6 之外还剩 4 最老
        assert_eq!(lru.victim(&candidates), 4);
    }

    #[test]
    fn lru_skips_stale_tokens() {
        let mut lru = Lru::default();
        lru.insert(7);
        lru.insert(8);
        // 7 已不在候选者里（比如换了线程）
        assert_eq!(lru.victim(&[8, 9]), 8);
    }
}
