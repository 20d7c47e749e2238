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
    use std::collections::HashSet;
    use std::error::Error;
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;

    use rib_core::rib::config::{AnnounceMode, ProtocolConfig, MASTER_TABLE};
    use rib_core::test_types::{net, Recorder};
    use rib_core::{
        Dest, Filter, Net, ProtoState, ProtocolId, ProtocolKind, Rib,
        RouteCandidate, RouteSource, Rta, TableId,
    };

    fn route(proto: ProtocolId, last: u8) -> Option<RouteCandidate> {
        Some(RouteCandidate::new(Rta::new(
            proto,
            RouteSource::Static,
            Dest::Router {
                gw: IpAddr::V4(Ipv4Addr::new(10, 255, 0, last)),
                iface: None,
            },
        )))
    }

    fn all_nets() -> Vec<Net> {
        (0..600u32)
            .map(|i| net(&format!("10.{}.{}.0/24", i / 256, i % 256)))
            .collect()
    }

    /// A table with 600 networks from one static protocol, and a second
    /// route from another one for every tenth network.
    fn filled() -> Result<(Rib, TableId, Vec<Net>), Box<dyn Error>> {
        crate::common::init();
        let mut rib = Rib::try_default()?;
        let table = rib.table_id(MASTER_TABLE)?;
        let mut ids = Vec::new();
        for name in ["static1", "static2"] {
            let id = rib.add_protocol(
                ProtocolConfig::new(name, ProtocolKind::Static),
                Rc::new(Recorder::new()),
            )?;
            rib.set_protocol_state(id, ProtoState::Up)?;
            ids.push(id);
        }
        let nets = all_nets();
        for (i, n) in nets.iter().enumerate() {
            rib.update(table, *n, ids[0], route(ids[0], 1))?;
            if i % 10 == 0 {
                rib.update(table, *n, ids[1], route(ids[1], 2))?;
            }
        }
        Ok((rib, table, nets))
    }

    fn observer(
        rib: &mut Rib,
        mode: AnnounceMode,
    ) -> Result<(ProtocolId, Rc<Recorder>), Box<dyn Error>> {
        let rec = Rc::new(Recorder::new());
        let id = rib.add_protocol(
            ProtocolConfig::new("kernel1", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::Accept)
                .with_announce(mode),
            rec.clone(),
        )?;
        Ok((id, rec))
    }

    #[test]
    fn coming_up_feeds_best_routes() -> Result<(), Box<dyn Error>> {
        let (mut rib, table, nets) = filled()?;
        let (o, rec) = observer(&mut rib, AnnounceMode::Optimal)?;
        assert!(rec.take().is_empty());

        rib.set_protocol_state(o, ProtoState::Up)?;
        let seen = rec.take();
        assert_eq!(seen.len(), nets.len());
        assert!(seen.iter().all(|c| c.old.is_none()
            && c.table == table
            && c.new.as_ref().is_some_and(|r| r.feed)));
        let fed: HashSet<Net> = seen.iter().map(|c| c.net).collect();
        assert_eq!(fed, nets.iter().copied().collect());
        // Only the announced copies are marked, not the stored routes.
        assert!(nets.iter().all(|n| rib
            .table(table)
            .is_ok_and(|t| t.routes(n).iter().all(|r| r.flags.is_empty()))));

        let hook = rib.hooks_of(o)[0];
        assert!(!rib.hook(hook).unwrap().is_feeding());
        assert_eq!(rib.hook(hook).unwrap().stats().updates_accepted, 600);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        Ok(())
    }

    #[test]
    fn any_mode_feeds_every_route() -> Result<(), Box<dyn Error>> {
        let (mut rib, _, nets) = filled()?;
        let (o, rec) = observer(&mut rib, AnnounceMode::Any)?;
        rib.set_protocol_state(o, ProtoState::Up)?;
        assert_eq!(rec.take().len(), nets.len() + nets.len() / 10);
        Ok(())
    }

    #[test]
    fn connecting_an_up_protocol_feeds_it() -> Result<(), Box<dyn Error>> {
        let (mut rib, table, nets) = filled()?;
        let rec = Rc::new(Recorder::new());
        let o = rib.add_protocol(
            ProtocolConfig::new("kernel1", ProtocolKind::Kernel)
                .with_export(Filter::Accept),
            rec.clone(),
        )?;
        rib.set_protocol_state(o, ProtoState::Up)?;
        assert!(rec.take().is_empty());

        rib.connect(o, table)?;
        assert_eq!(rec.take().len(), nets.len());
        assert!(rib.connect(o, table).is_err());
        Ok(())
    }

    #[test]
    fn feed_survives_table_changes() -> Result<(), Box<dyn Error>> {
        let (mut rib, table, nets) = filled()?;
        let (o, rec) = observer(&mut rib, AnnounceMode::Optimal)?;
        rib.set_protocol_state(o, ProtoState::Up)?;
        rec.take();

        // Start over, a step at a time.
        let hook = rib.hooks_of(o)[0];
        assert!(!rib.feed_step(hook, 100)?);
        assert!(rib.hook(hook).unwrap().is_feeding());
        let first: HashSet<Net> = rec.take().iter().map(|c| c.net).collect();
        assert_eq!(first.len(), 100);

        // Withdraw and prune every other network in the middle of it.
        let p = rib.protocol_id("static1")?;
        let q = rib.protocol_id("static2")?;
        let gone: HashSet<Net> =
            nets.iter().step_by(2).copied().collect();
        for n in &gone {
            rib.update(table, *n, q, None)?;
            rib.update(table, *n, p, None)?;
        }
        rib.prune(table)?;
        assert_eq!(rib.table(table)?.network_count(), 300);
        let withdrawn = rec.take();
        assert_eq!(withdrawn.len(), 300);
        assert!(withdrawn.iter().all(|c| c.new.is_none()));

        while !rib.feed_step(hook, 100)? {}
        let rest: Vec<Net> = rec.take().iter().map(|c| c.net).collect();
        assert!(rest.iter().all(|n| !gone.contains(n)));
        assert!(nets
            .iter()
            .filter(|n| !gone.contains(n))
            .all(|n| first.contains(n) || rest.contains(n)));
        assert!(!rib.hook(hook).unwrap().is_feeding());
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        Ok(())
    }

    #[test]
    fn disconnect_abandons_the_feed() -> Result<(), Box<dyn Error>> {
        let (mut rib, table, _) = filled()?;
        let (o, rec) = observer(&mut rib, AnnounceMode::Optimal)?;
        rib.set_protocol_state(o, ProtoState::Up)?;
        rec.take();

        let hook = rib.hooks_of(o)[0];
        assert!(!rib.feed_step(hook, 10)?);
        assert_eq!(rib.table(table)?.fib().live_iterators(), 1);
        rib.disconnect(hook)?;
        assert_eq!(rib.table(table)?.fib().live_iterators(), 0);
        assert!(rib.hook(hook).is_none());
        assert!(rib.feed_step(hook, 10).is_err());
        Ok(())
    }
}
