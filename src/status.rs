use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::directory::{Availability, Directory, HostStatus, TriggerRecord};
use crate::icon::{self, Rgb};
use crate::model::*;

/// How far back a trigger change still counts as "recent" for the corner
/// marks (the classic half-hour blink period).
pub const RECENCY_WINDOW_SECS: i64 = 30 * 60;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("map {0} contains itself through a chain of sub-map elements")]
    CyclicMap(MapId),
}

/// Immutable aggregation context shared by every resolver. Carries the
/// lookups and clock instead of ambient state; per-map display options are
/// read from each map definition as the recursion descends.
pub struct StatusContext<'a> {
    pub directory: &'a dyn Directory,
    /// Whether acknowledgement display is enabled at all; when off, every
    /// map behaves as if `show_unack` were `All`.
    pub ack_enabled: bool,
    pub now: i64,
    pub recency_window: i64,
}

impl<'a> StatusContext<'a> {
    pub fn new(directory: &'a dyn Directory, now: i64) -> StatusContext<'a> {
        StatusContext {
            directory,
            ack_enabled: true,
            now,
            recency_window: RECENCY_WINDOW_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MapOpts {
    expand_problem: bool,
    show_unack: AckFilter,
}

impl MapOpts {
    fn for_map(ctx: &StatusContext, map: &MapDef) -> MapOpts {
        MapOpts {
            expand_problem: map.expand_problem,
            show_unack: if ctx.ack_enabled { map.show_unack } else { AckFilter::All },
        }
    }
}

/// One ready-to-render status message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoLine {
    pub msg: String,
    pub color: Rgb,
}

/// Aggregated state of one map element. Computed fresh for every render
/// request and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub name: String,
    pub kind: ElementKind,
    pub status: StatusKind,
    /// Highest priority among contributing firing triggers; NotClassified
    /// outside the PROBLEM state.
    pub priority: Priority,
    pub problems: u32,
    pub unknowns: u32,
    pub oks: u32,
    pub unack: u32,
    /// Description of the highest-priority firing trigger, for the
    /// single-problem expansion.
    pub problem_info: Option<String>,
    /// De-duplicated ids of contributing firing triggers.
    pub triggers: BTreeSet<TriggerId>,
    /// Hosts currently under maintenance that contribute to this element.
    pub maintenances: BTreeSet<HostId>,
    pub lately_changed: bool,
    pub disabled: bool,
    pub unavailable: bool,
    /// True when nothing contributing is unacknowledged.
    pub ack: bool,
    pub icon_type: IconType,
    pub info: Vec<InfoLine>,
}

impl StatusInfo {
    fn new(name: String, kind: ElementKind) -> StatusInfo {
        StatusInfo {
            name,
            kind,
            status: StatusKind::Ok,
            priority: Priority::NotClassified,
            problems: 0,
            unknowns: 0,
            oks: 0,
            unack: 0,
            problem_info: None,
            triggers: BTreeSet::new(),
            maintenances: BTreeSet::new(),
            lately_changed: false,
            disabled: false,
            unavailable: false,
            ack: true,
            icon_type: IconType::Off,
            info: Vec::new(),
        }
    }

    /// Worst-state-wins combinator: severity is the max of both sides,
    /// priority breaks ties inside PROBLEM, counts accumulate, id sets
    /// union. Merging can never lower the receiver's severity.
    pub fn merge_worst(&mut self, other: &StatusInfo) {
        self.status = self.status.max(other.status);
        if other.priority > self.priority {
            self.priority = other.priority;
            self.problem_info = other.problem_info.clone();
        }
        self.problems += other.problems;
        self.unknowns += other.unknowns;
        self.oks += other.oks;
        self.unack += other.unack;
        self.triggers.extend(other.triggers.iter().copied());
        self.maintenances.extend(other.maintenances.iter().copied());
        self.lately_changed |= other.lately_changed;
        self.disabled |= other.disabled;
        self.unavailable |= other.unavailable;
        self.ack &= other.ack;
    }
}

/// DISABLED beats MAINTENANCE beats the severity-derived states.
fn resolve_icon_type(disabled: bool, in_maintenance: bool, status: StatusKind) -> IconType {
    if disabled {
        IconType::Disabled
    } else if in_maintenance {
        IconType::Maintenance
    } else {
        match status {
            StatusKind::Problem => IconType::On,
            StatusKind::Unknown => IconType::Unknown,
            StatusKind::Ok => IconType::Off,
        }
    }
}

/// Computes a [`StatusInfo`] for every element of `map`. Elements that
/// reference a missing underlying object are skipped with a warning; a
/// sub-map cycle aborts the whole aggregation.
pub fn aggregate_map(
    ctx: &StatusContext,
    map: &MapDef,
) -> Result<BTreeMap<ElementId, StatusInfo>, StatusError> {
    let mut visited = BTreeSet::new();
    visited.insert(map.id);
    aggregate_visited(ctx, map, &mut visited)
}

fn aggregate_visited(
    ctx: &StatusContext,
    map: &MapDef,
    visited: &mut BTreeSet<MapId>,
) -> Result<BTreeMap<ElementId, StatusInfo>, StatusError> {
    let opts = MapOpts::for_map(ctx, map);
    let mut statuses = BTreeMap::new();

    for element in &map.elements {
        let resolved = match element.target {
            ElementRef::Host(id) => resolve_host(ctx, &opts, id),
            ElementRef::HostGroup(id) => resolve_group(ctx, &opts, id),
            ElementRef::Trigger(id) => resolve_trigger(ctx, id),
            ElementRef::Map(id) => resolve_submap(ctx, &opts, id, visited)?,
            ElementRef::Image => Some(resolve_image()),
        };

        match resolved {
            Some(info) => {
                statuses.insert(element.id, info);
            }
            None => {
                warn!(
                    element = element.id,
                    map = map.id,
                    referenced = ?element.target,
                    "skipping element with missing underlying object"
                );
            }
        }
    }

    Ok(statuses)
}

/// Worst state over one set of trigger records, with the priority
/// tie-break and recency tracking shared by the host and group resolvers.
#[derive(Debug, Default)]
struct TriggerTally {
    status: StatusKind,
    priority: Priority,
    problem_info: Option<String>,
    problems: u32,
    unknowns: u32,
    oks: u32,
    unack: u32,
    triggers: BTreeSet<TriggerId>,
    lately_changed: bool,
}

impl TriggerTally {
    fn collect(ctx: &StatusContext, records: impl IntoIterator<Item = TriggerRecord>) -> Self {
        let mut tally = TriggerTally::default();

        for trigger in records {
            if !trigger.enabled {
                continue;
            }

            let kind = StatusKind::from(trigger.value);
            tally.status = tally.status.max(kind);

            match kind {
                StatusKind::Problem => {
                    tally.problems += 1;
                    tally.triggers.insert(trigger.id);
                    if !trigger.acknowledged {
                        tally.unack += 1;
                    }
                    if tally.problem_info.is_none() || trigger.priority > tally.priority {
                        tally.priority = trigger.priority;
                        tally.problem_info = Some(trigger.description.clone());
                    }
                }
                StatusKind::Unknown => tally.unknowns += 1,
                StatusKind::Ok => tally.oks += 1,
            }

            if trigger.value != TriggerValue::Unknown
                && ctx.now - trigger.last_change < ctx.recency_window
            {
                tally.lately_changed = true;
            }
        }

        tally
    }

    fn apply(self, info: &mut StatusInfo) {
        info.status = self.status;
        info.priority = self.priority;
        info.problem_info = self.problem_info;
        info.problems = self.problems;
        info.unknowns = self.unknowns;
        info.oks = self.oks;
        info.unack = self.unack;
        info.triggers = self.triggers;
        info.lately_changed = self.lately_changed;
    }
}

fn problem_color(priority: Priority) -> Rgb {
    if priority > Priority::Average { icon::RED } else { icon::DARK_RED }
}

fn problem_message(info: &StatusInfo, expand: bool) -> String {
    if info.problems == 1 {
        if expand {
            if let Some(desc) = &info.problem_info {
                return desc.clone();
            }
        }
        "1 problem".to_string()
    } else {
        format!("{} problems", info.problems)
    }
}

/// Builds the ordered info lines and the final icon type from the
/// accumulated counts. Used by every resolver that went through trigger or
/// child aggregation; the host special-case branches bypass it.
fn finalize(info: &mut StatusInfo, opts: &MapOpts) {
    info.ack = info.unack == 0;

    let mut lines = Vec::new();

    if info.status == StatusKind::Problem {
        if opts.show_unack.shows_problems() {
            lines.push(InfoLine {
                msg: problem_message(info, opts.expand_problem),
                color: problem_color(info.priority),
            });
        }
        if opts.show_unack.shows_unack() && info.unack > 0 {
            lines.push(InfoLine {
                msg: format!("{} unacknowledged", info.unack),
                color: icon::DARK_RED,
            });
        }
    }

    if !info.maintenances.is_empty()
        && matches!(info.kind, ElementKind::HostGroup | ElementKind::Map)
    {
        lines.push(InfoLine {
            msg: format!("{} maintenance", info.maintenances.len()),
            color: icon::ORANGE,
        });
    }

    if info.unknowns > 0 && info.status != StatusKind::Ok {
        lines.push(InfoLine {
            msg: format!("{} unknown", info.unknowns),
            color: icon::GRAY,
        });
    }

    if info.status == StatusKind::Ok {
        lines.push(InfoLine { msg: "OK".to_string(), color: icon::DARK_GREEN });
    }

    if info.unavailable {
        lines.push(InfoLine { msg: "Unavailable".to_string(), color: icon::RED });
    }

    info.icon_type = resolve_icon_type(info.disabled, !info.maintenances.is_empty(), info.status);
    info.info = lines;
}

fn resolve_host(ctx: &StatusContext, opts: &MapOpts, host_id: HostId) -> Option<StatusInfo> {
    let host = ctx.directory.host(host_id)?;
    let mut info = StatusInfo::new(host.name.clone(), ElementKind::Host);

    // Template, disabled, and maintenance states trump trigger severity.
    match host.status {
        HostStatus::Template => {
            info.info.push(InfoLine { msg: "is a template".to_string(), color: icon::GRAY });
            info.icon_type = IconType::Off;
            return Some(info);
        }
        HostStatus::NotMonitored => {
            info.disabled = true;
            info.info.push(InfoLine { msg: "Disabled".to_string(), color: icon::DARK_RED });
            info.icon_type = IconType::Disabled;
            return Some(info);
        }
        HostStatus::Monitored => {}
    }

    if let Some(maintenance) = host.maintenance {
        info.maintenances.insert(host.id);
        let msg = match ctx.directory.maintenance_name(maintenance) {
            Some(name) => format!("Maintenance ({name})"),
            None => "Maintenance".to_string(),
        };
        info.info.push(InfoLine { msg, color: icon::ORANGE });
        info.icon_type = IconType::Maintenance;
        return Some(info);
    }

    info.unavailable = host.available == Availability::Unavailable;
    TriggerTally::collect(ctx, ctx.directory.host_triggers(host_id)).apply(&mut info);
    finalize(&mut info, opts);
    Some(info)
}

fn resolve_group(ctx: &StatusContext, opts: &MapOpts, group_id: GroupId) -> Option<StatusInfo> {
    let group = ctx.directory.host_group(group_id)?;
    let mut info = StatusInfo::new(group.name.clone(), ElementKind::HostGroup);

    for host_id in &group.hosts {
        let Some(host) = ctx.directory.host(*host_id) else {
            warn!(host = host_id, group = group_id, "group references missing host");
            continue;
        };
        if host.status == HostStatus::Template {
            continue;
        }
        if host.status != HostStatus::Monitored {
            info.disabled = true;
        }
        if host.available == Availability::Unavailable {
            info.unavailable = true;
        }
        if host.maintenance.is_some() {
            info.maintenances.insert(host.id);
        }
    }

    // Trigger scope already excludes template, unmonitored, and
    // in-maintenance member hosts.
    TriggerTally::collect(ctx, ctx.directory.group_triggers(group_id)).apply(&mut info);
    finalize(&mut info, opts);
    Some(info)
}

fn resolve_trigger(ctx: &StatusContext, trigger_id: TriggerId) -> Option<StatusInfo> {
    let trigger = ctx.directory.trigger(trigger_id)?;
    let mut info = StatusInfo::new(trigger.description.clone(), ElementKind::Trigger);

    if !trigger.enabled {
        info.disabled = true;
        info.info.push(InfoLine { msg: "Disabled".to_string(), color: icon::DARK_RED });
        info.icon_type = IconType::Disabled;
        return Some(info);
    }

    info.status = StatusKind::from(trigger.value);
    info.lately_changed = trigger.value != TriggerValue::Unknown
        && ctx.now - trigger.last_change < ctx.recency_window;

    match info.status {
        StatusKind::Problem => {
            info.priority = trigger.priority;
            info.problem_info = Some(trigger.description.clone());
            info.problems = 1;
            info.triggers.insert(trigger.id);
            if !trigger.acknowledged {
                info.unack = 1;
            }
            info.info.push(InfoLine {
                msg: "PROBLEM".to_string(),
                color: problem_color(trigger.priority),
            });
        }
        StatusKind::Unknown => {
            info.unknowns = 1;
            info.info.push(InfoLine { msg: "UNKNOWN".to_string(), color: icon::GRAY });
        }
        StatusKind::Ok => {
            info.oks = 1;
            info.info.push(InfoLine { msg: "OK".to_string(), color: icon::DARK_GREEN });
        }
    }

    info.ack = info.unack == 0;
    info.icon_type = resolve_icon_type(false, false, info.status);
    Some(info)
}

fn resolve_submap(
    ctx: &StatusContext,
    opts: &MapOpts,
    map_id: MapId,
    visited: &mut BTreeSet<MapId>,
) -> Result<Option<StatusInfo>, StatusError> {
    let Some(submap) = ctx.directory.map(map_id) else {
        return Ok(None);
    };

    if !visited.insert(map_id) {
        return Err(StatusError::CyclicMap(map_id));
    }
    let children = aggregate_visited(ctx, &submap, visited);
    visited.remove(&map_id);
    let children = children?;

    let mut info = StatusInfo::new(submap.name.clone(), ElementKind::Map);
    for child in children.values() {
        info.merge_worst(child);
    }

    // Counts merged per-child double-count triggers shared between
    // children; the de-duplicated firing set is authoritative for both
    // the problem and unacknowledged totals.
    info.problems = info.triggers.len() as u32;
    info.unack = info
        .triggers
        .iter()
        .filter(|id| ctx.directory.trigger(**id).is_some_and(|t| !t.acknowledged))
        .count() as u32;
    if opts.expand_problem && info.triggers.len() == 1 {
        let only = *info.triggers.iter().next().unwrap_or(&0);
        if let Some(trigger) = ctx.directory.trigger(only) {
            info.priority = trigger.priority;
            info.problem_info = Some(trigger.description);
        }
    }

    finalize(&mut info, opts);
    Ok(Some(info))
}

fn resolve_image() -> StatusInfo {
    let mut info = StatusInfo::new("Image".to_string(), ElementKind::Image);
    info.icon_type = IconType::Off;
    info.info.push(InfoLine { msg: "OK".to_string(), color: icon::DARK_GREEN });
    info
}
