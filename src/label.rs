use crate::directory::{AggFunc, Directory, SeriesValue, TimeSeries};
use crate::model::{ElementRef, HostId};
use crate::status::StatusInfo;
use crate::utils::convert_units;

/// Inline marker for a macro whose host, item, or usage cannot be resolved.
pub const UNRESOLVED: &str = "???";
/// Inline marker for a resolvable item with an empty result set.
pub const NO_DATA: &str = "(no data)";

/// A parsed label macro. Labels mix plain text with `{...}` tokens; tokens
/// that fail to parse stay in the output verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Macro {
    Simple(SimpleMacro),
    Func(FuncMacro),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleMacro {
    HostName,
    HostDns,
    IpAddress,
    HostConn,
    Counter(CounterMacro),
}

/// The acknowledged/unacknowledged trigger and event counters. All map onto
/// the aggregated firing set: UNACK variants count unacknowledged firing
/// triggers, ACK variants the acknowledged remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterMacro {
    TriggersUnack,
    TriggersProblemUnack,
    TriggerEventsUnack,
    TriggerEventsProblemUnack,
    TriggerProblemEventsProblemUnack,
    TriggersAck,
    TriggersProblemAck,
    TriggerEventsAck,
    TriggerEventsProblemAck,
    TriggerProblemEventsProblemAck,
}

impl CounterMacro {
    fn counts_acknowledged(self) -> bool {
        matches!(
            self,
            CounterMacro::TriggersAck
                | CounterMacro::TriggersProblemAck
                | CounterMacro::TriggerEventsAck
                | CounterMacro::TriggerEventsProblemAck
                | CounterMacro::TriggerProblemEventsProblemAck
        )
    }

    fn value(self, status: &StatusInfo) -> u32 {
        if self.counts_acknowledged() {
            status.problems.saturating_sub(status.unack)
        } else {
            status.unack
        }
    }
}

/// A `{host:key.func(param)}` time-series call.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncMacro {
    pub host: String,
    pub key: String,
    pub func: AggFunc,
    pub param: String,
}

impl SimpleMacro {
    fn parse(body: &str) -> Option<SimpleMacro> {
        use CounterMacro::*;
        let counter = |c| Some(SimpleMacro::Counter(c));
        match body {
            "HOSTNAME" => Some(SimpleMacro::HostName),
            "HOST.DNS" => Some(SimpleMacro::HostDns),
            "IPADDRESS" => Some(SimpleMacro::IpAddress),
            "HOST.CONN" => Some(SimpleMacro::HostConn),
            "TRIGGERS.UNACK" => counter(TriggersUnack),
            "TRIGGERS.PROBLEM.UNACK" => counter(TriggersProblemUnack),
            "TRIGGER.EVENTS.UNACK" => counter(TriggerEventsUnack),
            "TRIGGER.EVENTS.PROBLEM.UNACK" => counter(TriggerEventsProblemUnack),
            "TRIGGER.PROBLEM.EVENTS.PROBLEM.UNACK" => counter(TriggerProblemEventsProblemUnack),
            "TRIGGERS.ACK" => counter(TriggersAck),
            "TRIGGERS.PROBLEM.ACK" => counter(TriggersProblemAck),
            "TRIGGER.EVENTS.ACK" => counter(TriggerEventsAck),
            "TRIGGER.EVENTS.PROBLEM.ACK" => counter(TriggerEventsProblemAck),
            "TRIGGER.PROBLEM.EVENTS.PROBLEM.ACK" => counter(TriggerProblemEventsProblemAck),
            _ => None,
        }
    }
}

/// Parses the text between one `{` `}` pair into a typed macro.
pub fn parse_macro(body: &str) -> Option<Macro> {
    if let Some(simple) = SimpleMacro::parse(body) {
        return Some(Macro::Simple(simple));
    }

    // {host:key.func(param)} — the key itself may contain dots and
    // brackets, so the function name is the last dotted segment before the
    // opening parenthesis.
    let (host, rest) = body.split_once(':')?;
    let rest = rest.strip_suffix(')')?;
    let paren = rest.rfind('(')?;
    let (call, param) = (&rest[..paren], &rest[paren + 1..]);
    let dot = call.rfind('.')?;
    let func = AggFunc::parse(&call[dot + 1..])?;
    let key = &call[..dot];
    if host.is_empty() || key.is_empty() {
        return None;
    }

    Some(Macro::Func(FuncMacro {
        host: host.to_string(),
        key: key.to_string(),
        func,
        param: param.to_string(),
    }))
}

/// What a label belongs to: links carry no element target, so only
/// function macros resolve for them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelScope<'a> {
    pub target: Option<ElementRef>,
    pub status: Option<&'a StatusInfo>,
}

impl<'a> LabelScope<'a> {
    pub fn element(target: ElementRef, status: Option<&'a StatusInfo>) -> LabelScope<'a> {
        LabelScope { target: Some(target), status }
    }

    pub fn link() -> LabelScope<'static> {
        LabelScope::default()
    }
}

/// Expands every macro occurrence in `text` exactly once, in a single
/// left-to-right pass. Replacement text is never re-scanned, so a resolved
/// value that happens to contain `{...}` stays as-is.
pub fn expand_label(
    text: &str,
    scope: &LabelScope,
    directory: &dyn Directory,
    series: &dyn TimeSeries,
    now: i64,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];

        let Some(close) = after.find('}') else {
            out.push_str(after);
            return out;
        };

        let token = &after[..=close];
        let body = &token[1..token.len() - 1];
        match parse_macro(body) {
            Some(Macro::Simple(simple)) => match eval_simple(simple, scope, directory) {
                Some(value) => out.push_str(&value),
                None => out.push_str(token),
            },
            Some(Macro::Func(func)) => {
                out.push_str(&eval_func(&func, directory, series, now));
            }
            None => out.push_str(token),
        }

        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

/// Host of the element the label sits on, for the `{HOSTNAME}` family.
fn scope_host(scope: &LabelScope, directory: &dyn Directory) -> Option<HostId> {
    match scope.target? {
        ElementRef::Host(id) => Some(id),
        ElementRef::Trigger(id) => directory.trigger(id).map(|t| t.host),
        _ => None,
    }
}

fn eval_simple(
    simple: SimpleMacro,
    scope: &LabelScope,
    directory: &dyn Directory,
) -> Option<String> {
    match simple {
        SimpleMacro::Counter(counter) => {
            // Counters apply to the trigger-bearing element kinds only.
            match scope.target? {
                ElementRef::Image => None,
                _ => scope.status.map(|status| counter.value(status).to_string()),
            }
        }
        _ => {
            let host = directory.host(scope_host(scope, directory)?)?;
            let value = match simple {
                SimpleMacro::HostName => host.name,
                SimpleMacro::HostDns => host.dns,
                SimpleMacro::IpAddress => host.ip,
                SimpleMacro::HostConn => host.conn().to_string(),
                SimpleMacro::Counter(_) => unreachable!("handled above"),
            };
            Some(value)
        }
    }
}

fn eval_func(
    func: &FuncMacro,
    directory: &dyn Directory,
    series: &dyn TimeSeries,
    now: i64,
) -> String {
    let Some(item) = directory.item_by_key(&func.host, &func.key) else {
        return UNRESOLVED.to_string();
    };

    match func.func {
        AggFunc::Last => match series.latest(item.id) {
            Some(SeriesValue::Num(value)) => convert_units(value, &item.units),
            Some(SeriesValue::Text(text)) => text,
            None => NO_DATA.to_string(),
        },
        AggFunc::Min | AggFunc::Max | AggFunc::Avg => {
            if !item.value_type.is_numeric() {
                return UNRESOLVED.to_string();
            }
            let Ok(window) = func.param.trim().parse::<i64>() else {
                return UNRESOLVED.to_string();
            };
            match series.aggregate(item.id, func.func, window, now) {
                Some(value) => convert_units(value, &item.units),
                None => NO_DATA.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{
        Availability, HistoryRow, HostRecord, HostStatus, ItemRecord, ValueType, World,
    };

    fn world() -> World {
        World {
            hosts: vec![HostRecord {
                id: 1,
                name: "srv1".into(),
                dns: "srv1.example.net".into(),
                ip: "192.0.2.10".into(),
                use_ip: true,
                status: HostStatus::Monitored,
                available: Availability::Available,
                maintenance: None,
            }],
            items: vec![
                ItemRecord {
                    id: 1,
                    host: 1,
                    key: "cpu.load".into(),
                    value_type: ValueType::Float,
                    units: String::new(),
                },
                ItemRecord {
                    id: 2,
                    host: 1,
                    key: "agent.version".into(),
                    value_type: ValueType::Str,
                    units: String::new(),
                },
            ],
            history: vec![HistoryRow { item: 1, clock: 90, value: Some(0.35), text: None }],
            ..World::default()
        }
    }

    fn host_scope() -> LabelScope<'static> {
        LabelScope { target: Some(ElementRef::Host(1)), status: None }
    }

    #[test]
    fn parses_function_macro_with_dotted_key() {
        let parsed = parse_macro("srv1:system.cpu.load.avg(300)");
        assert_eq!(
            parsed,
            Some(Macro::Func(FuncMacro {
                host: "srv1".into(),
                key: "system.cpu.load".into(),
                func: AggFunc::Avg,
                param: "300".into(),
            }))
        );
    }

    #[test]
    fn rejects_malformed_macros() {
        assert_eq!(parse_macro("NOT.A.MACRO"), None);
        assert_eq!(parse_macro("srv1:key"), None);
        assert_eq!(parse_macro("srv1:key.explode(60)"), None);
        assert_eq!(parse_macro(":key.last()"), None);
    }

    #[test]
    fn expands_simple_host_tokens() {
        let world = world();
        let out = expand_label("{HOSTNAME} load", &host_scope(), &world, &world, 100);
        assert_eq!(out, "srv1 load");

        // use_ip is set, so {HOST.CONN} resolves to the address.
        let out = expand_label("{HOST.CONN}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "192.0.2.10");
    }

    #[test]
    fn last_function_macro_reads_latest_value() {
        let world = world();
        let out = expand_label("{srv1:cpu.load.last()}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "0.35");
    }

    #[test]
    fn empty_series_yields_no_data_marker() {
        let mut world = world();
        world.history.clear();
        let out = expand_label("{srv1:cpu.load.last()}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "(no data)");
    }

    #[test]
    fn unknown_host_or_item_yields_question_marks() {
        let world = world();
        let out = expand_label("{ghost:cpu.load.last()}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "???");
        let out = expand_label("{srv1:missing.key.min(60)}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "???");
    }

    #[test]
    fn aggregate_over_non_numeric_item_is_unresolved() {
        let world = world();
        let out =
            expand_label("{srv1:agent.version.avg(60)}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "???");
    }

    #[test]
    fn tokens_that_do_not_apply_stay_verbatim() {
        let world = world();
        let scope = LabelScope::link();
        let out = expand_label("{HOSTNAME} up", &scope, &world, &world, 100);
        assert_eq!(out, "{HOSTNAME} up");
    }

    #[test]
    fn replacement_text_is_not_rescanned() {
        let mut world = world();
        world.hosts[0].name = "{HOST.DNS}".into();
        let out = expand_label("{HOSTNAME}", &host_scope(), &world, &world, 100);
        assert_eq!(out, "{HOST.DNS}");
    }
}
