use crate::evaluate::{Decision, HistoryWindow, WindowEntry, describe, evaluate};
use crate::notify::Notifier;
use crate::rule::{AlarmRule, validate_rules};
use crate::AlarmError;
use domain::{AlarmEvent, EventSink, GatewayEvent, PollEvent, now_epoch_ms};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// 告警引擎参数。
#[derive(Debug, Clone, Copy)]
pub struct AlarmEngineConfig {
    pub recent_capacity: usize,
    pub window_size: usize,
}

impl Default for AlarmEngineConfig {
    fn default() -> Self {
        Self {
            recent_capacity: 50,
            window_size: 10,
        }
    }
}

#[derive(Default)]
struct EngineState {
    rules: Vec<AlarmRule>,
    cooldown: HashMap<String, i64>,
    windows: HashMap<String, HistoryWindow>,
    trigger_counts: HashMap<String, u64>,
    recent: VecDeque<AlarmEvent>,
}

/// 有状态的告警引擎：规则集、冷却表、每设备历史窗口、最近告警。
pub struct AlarmEngine {
    config: AlarmEngineConfig,
    notifier: Arc<dyn Notifier>,
    events: Arc<dyn EventSink>,
    state: Mutex<EngineState>,
}

impl AlarmEngine {
    pub fn new(
        config: AlarmEngineConfig,
        notifier: Arc<dyn Notifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            notifier,
            events,
            state: Mutex::new(EngineState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 整体替换规则集；先校验，任一规则非法则不做任何修改。
    pub fn replace_rules(&self, rules: Vec<AlarmRule>) -> Result<(), AlarmError> {
        validate_rules(&rules)?;
        let mut state = self.lock();
        state
            .trigger_counts
            .retain(|id, _| rules.iter().any(|rule| &rule.id == id));
        state.cooldown.clear();
        let count = rules.len();
        state.rules = rules;
        drop(state);
        info!(target: "ems.alarm", rules = count, "alarm_rules_replaced");
        Ok(())
    }

    pub fn rules(&self) -> Vec<AlarmRule> {
        self.lock().rules.clone()
    }

    /// 处理一次轮询事件，返回本次触发的告警。
    pub fn process(&self, event: &PollEvent) -> Vec<AlarmEvent> {
        self.process_at(event, now_epoch_ms())
    }

    pub fn process_at(&self, event: &PollEvent, now_ms: i64) -> Vec<AlarmEvent> {
        let mut fired = Vec::new();
        let mut notify = Vec::new();
        {
            let mut state = self.lock();
            let state = &mut *state;
            let window = state
                .windows
                .entry(event.device_id.clone())
                .or_insert_with(|| HistoryWindow::new(self.config.window_size));
            window.push(WindowEntry {
                ts_ms: event.ts_ms,
                reading: event.reading().cloned(),
                status: event.status,
            });

            for rule in state.rules.iter().filter(|r| r.device_id == event.device_id) {
                let last = state.cooldown.get(&rule.id).copied();
                match evaluate(rule, window, last, now_ms) {
                    Decision::Idle => {}
                    Decision::Suppressed => {
                        ems_telemetry::record_alarm_suppressed();
                        debug!(target: "ems.alarm", rule_id = %rule.id, "alarm_suppressed");
                    }
                    Decision::Fire(trigger) => {
                        let (message, condition_text) =
                            describe(rule, &event.device_name, event.status, &trigger);
                        let alarm = AlarmEvent {
                            id: uuid::Uuid::new_v4().to_string(),
                            rule_id: rule.id.clone(),
                            device_id: event.device_id.clone(),
                            device_name: event.device_name.clone(),
                            severity: rule.severity,
                            message,
                            observed_value: trigger.observed,
                            condition_text,
                            triggered_at: now_ms,
                        };
                        state.cooldown.insert(rule.id.clone(), now_ms);
                        *state.trigger_counts.entry(rule.id.clone()).or_insert(0) += 1;
                        state.recent.push_back(alarm.clone());
                        while state.recent.len() > self.config.recent_capacity {
                            state.recent.pop_front();
                        }
                        if rule.notify_on_trigger {
                            notify.push(alarm.clone());
                        }
                        fired.push(alarm);
                    }
                }
            }
        }

        for alarm in &fired {
            ems_telemetry::record_alarm_fired();
            warn!(
                target: "ems.alarm",
                rule_id = %alarm.rule_id,
                device_id = %alarm.device_id,
                severity = %alarm.severity,
                message = %alarm.message,
                "alarm_triggered"
            );
            self.events.publish(GatewayEvent::AlarmTriggered(alarm.clone()));
        }
        for alarm in notify {
            self.spawn_notify(alarm);
        }
        fired
    }

    fn spawn_notify(&self, alarm: AlarmEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            ems_telemetry::record_notify_failure();
            warn!(target: "ems.alarm", rule_id = %alarm.rule_id, "notify_skipped_no_runtime");
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        handle.spawn(async move {
            let details = serde_json::to_value(&alarm).unwrap_or(serde_json::Value::Null);
            if let Err(err) = notifier.notify("alarm", &alarm.message, details).await {
                ems_telemetry::record_notify_failure();
                warn!(
                    target: "ems.alarm",
                    rule_id = %alarm.rule_id,
                    error = %err,
                    "notify_failed"
                );
            }
        });
    }

    /// 设备删除后丢弃其历史窗口。
    pub fn forget_device(&self, device_id: &str) {
        self.lock().windows.remove(device_id);
    }

    /// 当前持有历史窗口的设备。
    pub fn tracked_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().windows.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 最近告警，新的在前。
    pub fn recent(&self) -> Vec<AlarmEvent> {
        self.lock().recent.iter().rev().cloned().collect()
    }

    pub fn clear_recent(&self) {
        self.lock().recent.clear();
    }

    pub fn trigger_counts(&self) -> HashMap<String, u64> {
        self.lock().trigger_counts.clone()
    }
}
