// ==========================================
// 输送带胶料批次台账 - 工作日历
// ==========================================
// 纯函数: 周日与节假日为非工作日
// 无持久化状态（节假日表来自配置）
// ==========================================

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// 单次跳过非工作日的最大步数（日期溢出或节假日表异常时终止）
const MAX_CALENDAR_STEPS: u32 = 370;

#[derive(Debug, Clone, Default)]
pub struct WorkingCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WorkingCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// 是否工作日
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        date.weekday() != Weekday::Sun && !self.holidays.contains(&date)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// 严格晚于 date 的下一个工作日
    pub fn next_working_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.step(date, |d| d.succ_opt())
    }

    /// 严格早于 date 的上一个工作日
    pub fn previous_working_day(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.step(date, |d| d.pred_opt())
    }

    /// 向后对齐: date 本身是工作日则返回 date，否则取下一个工作日
    pub fn snap_forward(&self, date: NaiveDate) -> Option<NaiveDate> {
        if self.is_working_day(date) {
            Some(date)
        } else {
            self.next_working_day(date)
        }
    }

    fn step(&self, date: NaiveDate, advance: impl Fn(NaiveDate) -> Option<NaiveDate>) -> Option<NaiveDate> {
        let mut current = date;
        for _ in 0..MAX_CALENDAR_STEPS {
            current = advance(current)?;
            if self.is_working_day(current) {
                return Some(current);
            }
        }
        None
    }
}
