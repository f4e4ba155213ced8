// ==========================================
// 输送带胶料批次台账 - 生产日期分配器
// ==========================================
// 台账模型: 每个角色每天最多一个生产批次
// 规则:
// 1. 期望日期先对齐到工作日
// 2. 已被其他皮带（覆盖胶或贴胶）占用的日期不可用，逐日向后搜索（有限）
// 3. 覆盖胶与贴胶落在同一天 → 贴胶退到之前最近的可用工作日
// 4. 复核仍冲突 → 覆盖胶向后推，贴胶由覆盖胶重新推导
// 5. 双向搜索均耗尽 → DateCollision
// ==========================================

use crate::config::LedgerConfig;
use crate::engine::error::{LedgerError, LedgerResult};
use crate::engine::working_calendar::WorkingCalendar;
use crate::repository::BeltRepository;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// 日期分配请求
#[derive(Debug, Clone, Default)]
pub struct DateRequest {
    pub cover_wish: Option<NaiveDate>,
    pub skim_wish: Option<NaiveDate>,
    /// 更新皮带时排除自身已占用的日期
    pub exclude_belt_id: Option<String>,
}

/// 分配结果（未请求的角色为 None）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedDates {
    pub cover: Option<NaiveDate>,
    pub skim: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

pub struct ProductionDateAllocator {
    belt_repo: Arc<BeltRepository>,
    calendar: Arc<WorkingCalendar>,
    config: Arc<LedgerConfig>,
}

impl ProductionDateAllocator {
    pub fn new(
        belt_repo: Arc<BeltRepository>,
        calendar: Arc<WorkingCalendar>,
        config: Arc<LedgerConfig>,
    ) -> Self {
        Self {
            belt_repo,
            calendar,
            config,
        }
    }

    /// 分配覆盖胶/贴胶生产日期
    pub fn resolve(&self, request: &DateRequest) -> LedgerResult<ResolvedDates> {
        let exclude = request.exclude_belt_id.as_deref();

        let cover = match request.cover_wish {
            Some(wish) => Some(self.resolve_single(wish, exclude, None)?),
            None => None,
        };
        let mut skim = match request.skim_wish {
            Some(wish) => Some(self.resolve_single(wish, exclude, None)?),
            None => None,
        };

        let (Some(cover_date), Some(skim_date)) = (cover, skim) else {
            return Ok(ResolvedDates { cover, skim });
        };

        if cover_date == skim_date {
            debug!(date = %cover_date, "覆盖胶与贴胶日期相同，贴胶前移");
            skim = self.search_before(cover_date, exclude, Some(cover_date))?;
        }

        match skim {
            Some(s) if s != cover_date => Ok(ResolvedDates {
                cover: Some(cover_date),
                skim: Some(s),
            }),
            _ => self.push_cover_forward(cover_date, exclude),
        }
    }

    /// 对齐工作日并向后找第一个未占用日期
    fn resolve_single(
        &self,
        wish: NaiveDate,
        exclude: Option<&str>,
        avoid: Option<NaiveDate>,
    ) -> LedgerResult<NaiveDate> {
        let start = self.calendar.snap_forward(wish).ok_or_else(|| {
            LedgerError::CapacityExhausted(format!("{} 之后无可用工作日", wish))
        })?;
        self.search(start, Direction::Forward, exclude, avoid)?
            .ok_or_else(|| {
                LedgerError::CapacityExhausted(format!(
                    "{} 起 {} 个工作日内无可用生产日期",
                    wish, self.config.max_day_search
                ))
            })
    }

    /// 严格早于 date 的最近可用工作日
    fn search_before(
        &self,
        date: NaiveDate,
        exclude: Option<&str>,
        avoid: Option<NaiveDate>,
    ) -> LedgerResult<Option<NaiveDate>> {
        match self.calendar.previous_working_day(date) {
            Some(start) => self.search(start, Direction::Backward, exclude, avoid),
            None => Ok(None),
        }
    }

    /// 覆盖胶向后推一个可用日，贴胶取其之前最近的可用日
    fn push_cover_forward(
        &self,
        cover: NaiveDate,
        exclude: Option<&str>,
    ) -> LedgerResult<ResolvedDates> {
        let collision = LedgerError::DateCollision {
            cover,
            skim: cover,
        };

        let Some(start) = self.calendar.next_working_day(cover) else {
            return Err(collision);
        };
        let Some(new_cover) = self.search(start, Direction::Forward, exclude, None)? else {
            return Err(collision);
        };
        let Some(new_skim) = self.search_before(new_cover, exclude, Some(new_cover))? else {
            return Err(collision);
        };

        debug!(cover = %new_cover, skim = %new_skim, "覆盖胶后推后重新推导贴胶日期");
        Ok(ResolvedDates {
            cover: Some(new_cover),
            skim: Some(new_skim),
        })
    }

    /// 从 start（含）开始按方向逐个工作日搜索可用日期
    fn search(
        &self,
        start: NaiveDate,
        direction: Direction,
        exclude: Option<&str>,
        avoid: Option<NaiveDate>,
    ) -> LedgerResult<Option<NaiveDate>> {
        let mut day = start;
        for _ in 0..self.config.max_day_search {
            let usable = self.calendar.is_working_day(day)
                && Some(day) != avoid
                && !self.belt_repo.is_production_date_taken(day, exclude)?;
            if usable {
                return Ok(Some(day));
            }
            let next = match direction {
                Direction::Forward => self.calendar.next_working_day(day),
                Direction::Backward => self.calendar.previous_working_day(day),
            };
            match next {
                Some(d) => day = d,
                None => return Ok(None),
            }
        }
        Ok(None)
    }
}
