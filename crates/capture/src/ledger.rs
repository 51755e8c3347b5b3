//! 접근 원장 — 출발지별 목적지 이력
//!
//! [`AccessLedger`]는 이 시스템의 유일한 공유 가변 상태입니다.
//! verdict 경로(기록)와 보고 경로(스냅샷)가 동시에 접근하므로
//! 맵 전체를 하나의 뮤텍스로 보호합니다. `record`는 락 구간이
//! append 한 번으로 짧아 verdict 지연에 영향을 주지 않습니다.
//!
//! 키는 최초 관찰 시 생성되며 프로세스 수명 동안 제거되지 않습니다.
//! 이력 자체는 기본적으로 무제한 증가하며, 설정된 상한이 있으면
//! 출발지별로 가장 오래된 목적지부터 밀어냅니다.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Mutex;

/// 출발지별 목적지 이력 원장
#[derive(Debug)]
pub struct AccessLedger {
    inner: Mutex<HashMap<IpAddr, VecDeque<IpAddr>>>,
    /// 출발지당 보관할 최대 목적지 수 (0 = 무제한)
    max_history_per_source: usize,
}

impl AccessLedger {
    /// 무제한 이력 원장을 생성합니다.
    pub fn new() -> Self {
        Self::with_max_history(0)
    }

    /// 출발지당 이력 상한이 있는 원장을 생성합니다.
    pub fn with_max_history(max_history_per_source: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            max_history_per_source,
        }
    }

    /// 출발지의 이력에 목적지를 추가합니다.
    ///
    /// 항목이 없으면 생성합니다. 도착 순서가 보존되며 중복도
    /// 그대로 유지됩니다. 상한 초과 시 가장 오래된 목적지를 제거합니다.
    pub fn record(&self, source: IpAddr, destination: IpAddr) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let history = map.entry(source).or_default();
        history.push_back(destination);
        if self.max_history_per_source > 0 && history.len() > self.max_history_per_source {
            history.pop_front();
        }
    }

    /// 특정 시점의 일관된 사본을 반환합니다.
    ///
    /// 내부 가변 구조를 노출하지 않으므로 동시 기록 중에도
    /// torn read가 발생하지 않습니다.
    pub fn snapshot(&self) -> HashMap<IpAddr, Vec<IpAddr>> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.iter()
            .map(|(source, history)| (*source, history.iter().copied().collect()))
            .collect()
    }

    /// 현재 추적 중인 고유 출발지 수를 반환합니다.
    pub fn source_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 원장이 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.source_count() == 0
    }
}

impl Default for AccessLedger {
    fn default() -> Self {
        Self::new()
    }
}
