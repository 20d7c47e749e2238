mod common {
    use std::io::Write;

    pub fn init() {
        let _ = env_logger::builder()
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .is_test(true)
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::error::Error;
    use std::rc::Rc;

    use inetnum::addr::Prefix;
    use rib_core::rib::config::{ProtocolConfig, MASTER_TABLE};
    use rib_core::rib::RouteSummary;
    use rib_core::test_types::net;
    use rib_core::{
        Dest, Iface, NoHooks, ProtoState, ProtocolKind, Rib, RouteCandidate,
        RouteSource, Rta, TableId,
    };

    fn add_unreachable(
        rib: &mut Rib,
        count: u32,
    ) -> Result<(), Box<dyn Error>> {
        let rip = rib.protocol_id("rip1")?;
        let table = rib.table_id(MASTER_TABLE)?;
        for i in 0..count {
            let n = net(&format!("10.{}.{}.0/24", i / 256, i % 256));
            rib.update(
                table,
                n,
                rip,
                Some(RouteCandidate::new(Rta::new(
                    rip,
                    RouteSource::Rip,
                    Dest::Unreachable,
                ))),
            )?;
        }
        Ok(())
    }

    fn filled() -> Result<(Rib, TableId), Box<dyn Error>> {
        crate::common::init();
        let mut rib = Rib::try_default()?;
        let table = rib.table_id(MASTER_TABLE)?;
        let dev = rib.add_protocol(
            ProtocolConfig::new("direct1", ProtocolKind::Device),
            Rc::new(NoHooks),
        )?;
        let rip = rib.add_protocol(
            ProtocolConfig::new("rip1", ProtocolKind::Rip),
            Rc::new(NoHooks),
        )?;
        for p in [dev, rip] {
            rib.set_protocol_state(p, ProtoState::Up)?;
        }
        let eth0 = Iface::new(1, "eth0");
        for i in 0..50 {
            let n = net(&format!("172.16.{}.0/24", i));
            rib.update(
                table,
                n,
                rip,
                Some(RouteCandidate::new(Rta::new(
                    rip,
                    RouteSource::Rip,
                    Dest::Unreachable,
                ))),
            )?;
            if i % 5 == 0 {
                rib.update(
                    table,
                    n,
                    dev,
                    Some(RouteCandidate::new(Rta::new(
                        dev,
                        RouteSource::Device,
                        Dest::Device {
                            iface: eth0.clone(),
                        },
                    ))),
                )?;
            }
        }
        Ok((rib, table))
    }

    #[test]
    fn pages_hold_whole_networks() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = filled()?;
        let mut walk = rib.walk_start(table)?;
        assert_eq!(walk.table(), table);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 1);

        let mut pages: Vec<Vec<RouteSummary>> = Vec::new();
        loop {
            let page = rib.walk_page(&mut walk, 7);
            if page.is_empty() {
                break;
            }
            pages.push(page);
        }
        assert!(walk.is_done());
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        // One more page of a finished walk stays empty.
        assert!(rib.walk_page(&mut walk, 7).is_empty());

        let (last, full) = pages.split_last().unwrap();
        assert!(full.iter().all(|p| p.len() >= 7 && p.len() <= 8));
        assert!(!last.is_empty());

        let mut per_prefix: HashMap<Prefix, Vec<(usize, RouteSummary)>> =
            HashMap::new();
        for (i, page) in pages.iter().enumerate() {
            for s in page {
                per_prefix.entry(s.prefix).or_default().push((i, s.clone()));
            }
        }
        assert_eq!(per_prefix.len(), 50);
        assert_eq!(pages.iter().map(|p| p.len()).sum::<usize>(), 60);
        for routes in per_prefix.values() {
            // All routes of a network on one page, the best one first.
            assert!(routes.iter().all(|(i, _)| *i == routes[0].0));
            assert!(routes[0].1.best);
            assert!(routes.iter().skip(1).all(|(_, s)| !s.best));
            if routes.len() == 2 {
                assert_eq!(routes[0].1.proto, "direct1");
                assert_eq!(routes[0].1.pref, 240);
                assert_eq!(routes[0].1.dest, "dev eth0");
                assert_eq!(routes[1].1.proto, "rip1");
            } else {
                assert_eq!(routes[0].1.source, RouteSource::Rip);
                assert_eq!(routes[0].1.dest, "unreachable");
            }
        }

        let line = pages[0][0].to_string();
        assert!(line.starts_with("172.16."));
        assert!(line.contains("[direct1 ") || line.contains("[rip1 "));
        Ok(())
    }

    #[test]
    fn walks_can_be_finished_early() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = filled()?;
        let mut walk = rib.walk_start(table)?;
        assert!(!rib.walk_page(&mut walk, 10).is_empty());
        assert!(!walk.is_done());

        // The table may change between pages.
        let rip = rib.protocol_id("rip1")?;
        for i in 40..50 {
            rib.update(table, net(&format!("172.16.{}.0/24", i)), rip, None)?;
        }
        assert!(!rib.walk_page(&mut walk, 10).is_empty());

        rib.walk_finish(walk);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        Ok(())
    }

    #[test]
    fn dropped_walks_do_not_hold_up_the_table(
    ) -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = filled()?;
        let mut walk = rib.walk_start(table)?;
        assert!(!rib.walk_page(&mut walk, 10).is_empty());
        drop(walk);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 1);

        // The table still grows.
        assert_eq!(rib.table(table)?.fib().order(), 10);
        add_unreachable(&mut rib, 5000)?;
        assert_eq!(rib.table(table)?.fib().order(), 12);

        // The next walk cleans up after the dropped one.
        let walk = rib.walk_start(table)?;
        assert_eq!(rib.table(table)?.fib().live_iterators(), 1);
        rib.walk_finish(walk);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        Ok(())
    }

    #[test]
    fn walks_survive_growth() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = filled()?;
        let mut walk = rib.walk_start(table)?;
        let mut seen = rib.walk_page(&mut walk, 10);
        assert!(!seen.is_empty());

        add_unreachable(&mut rib, 5000)?;
        assert_eq!(rib.table(table)?.fib().order(), 12);
        loop {
            let page = rib.walk_page(&mut walk, 100);
            if page.is_empty() {
                break;
            }
            seen.extend(page);
        }

        let routes: HashSet<(Prefix, String)> = seen
            .iter()
            .map(|s| (s.prefix, s.proto.clone()))
            .collect();
        assert_eq!(routes.len(), seen.len());
        let old = seen
            .iter()
            .filter(|s| s.prefix.to_string().starts_with("172.16."))
            .count();
        assert_eq!(old, 60);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        Ok(())
    }
}
