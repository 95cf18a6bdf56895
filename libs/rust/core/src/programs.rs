//! Library of ready-made aggregate programs.
//!
//! These are the classic building blocks of aggregate programming, expressed
//! with the [`Expr`] builders. Sensor names are parameters so deployments can
//! map them onto whatever they actually sense.

use crate::ast::Expr;
use crate::builtins::Builtin;

fn inf() -> Expr { Expr::lit(f64::INFINITY) }

fn add(a: Expr, b: Expr) -> Expr { Expr::call(Builtin::Add, vec![a, b]) }

fn get(tuple: Expr, index: i32) -> Expr { Expr::call(Builtin::Get, vec![tuple, Expr::lit(index)]) }

/// Number of rounds this device has completed, starting at 0.
pub fn round_counter() -> Expr {
    Expr::rep(Expr::lit(0), "n", add(Expr::var("n"), Expr::lit(1)))
}

/// Hop count to the nearest device whose `source` sensor is true.
pub fn hop_gradient(source: &str) -> Expr {
    gradient_with(source, Expr::lit(1))
}

/// Distance to the nearest source, summing a neighbor-relative `metric`
/// sensor (e.g. estimated range) along the way.
pub fn gradient(source: &str, metric: &str) -> Expr {
    gradient_with(source, Expr::nbr_sense(metric))
}

fn gradient_with(source: &str, step: Expr) -> Expr {
    // Sources start at 0 so the first round already seeds the field.
    let seed = Expr::call(Builtin::Mux, vec![Expr::sense(source), Expr::lit(0), inf()]);
    Expr::rep(
        seed,
        "d",
        Expr::call(Builtin::Mux, vec![
            Expr::sense(source),
            Expr::lit(0),
            Expr::fold_plus(inf(), Expr::lit(Builtin::Min), add(Expr::nbr(Expr::var("d")), step)),
        ]),
    )
}

/// Spreads `value` (evaluated at sources) outwards along the shortest hop
/// path. Devices that have not heard from any source yield unit.
pub fn broadcast(source: &str, value: Expr) -> Expr {
    // Keeps the candidate with the smaller distance; payloads never compared.
    let closer = Expr::lambda(&["a", "b"], Expr::call(Builtin::Mux, vec![
        Expr::call(Builtin::Le, vec![get(Expr::var("a"), 0), get(Expr::var("b"), 0)]),
        Expr::var("a"),
        Expr::var("b"),
    ]));
    let unreached = Expr::call(Builtin::Tuple, vec![inf(), Expr::lit(())]);
    let relayed = Expr::call(Builtin::Tuple, vec![
        add(get(Expr::nbr(Expr::var("g")), 0), Expr::lit(1)),
        get(Expr::nbr(Expr::var("g")), 1),
    ]);
    let field = Expr::rep(
        unreached.clone(),
        "g",
        Expr::call(Builtin::Mux, vec![
            Expr::sense(source),
            Expr::call(Builtin::Tuple, vec![Expr::lit(0), value]),
            Expr::fold_plus(unreached, closer, relayed),
        ]),
    );
    get(field, 1)
}

/// How many neighbors currently run the same program.
pub fn neighbor_count() -> Expr {
    Expr::fold_plus(Expr::lit(0), Expr::lit(Builtin::Add), Expr::nbr(Expr::lit(1)))
}

/// Network-wide maximum of `local`, spread by gossip.
pub fn gossip_max(local: Expr) -> Expr {
    Expr::let_in(
        "local",
        local,
        Expr::rep(
            Expr::var("local"),
            "m",
            Expr::fold(Expr::var("local"), Expr::lit(Builtin::Max), Expr::nbr(Expr::var("m"))),
        ),
    )
}

/// Hop gradient computed only by devices inside `region`; devices outside
/// yield infinity and are invisible to the ones inside.
pub fn region_gradient(region: &str, source: &str) -> Expr {
    Expr::branch(Expr::sense(region), hop_gradient(source), inf())
}

/// Looks a program up by name, for configuration-driven deployments.
pub fn by_name(name: &str, source: &str) -> Option<Expr> {
    match name {
        "counter" => Some(round_counter()),
        "hop_gradient" => Some(hop_gradient(source)),
        "gradient" => Some(gradient(source, "range")),
        "broadcast" => Some(broadcast(source, Expr::SelfId)),
        "neighbor_count" => Some(neighbor_count()),
        "gossip_max" => Some(gossip_max(Expr::sense("value"))),
        "region_gradient" => Some(region_gradient("region", source)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        for name in ["counter", "hop_gradient", "gradient", "broadcast", "neighbor_count", "gossip_max", "region_gradient"] {
            assert!(by_name(name, "source").is_some(), "{name}");
        }
        assert!(by_name("nope", "source").is_none());
    }
}
