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
    use std::error::Error;
    use std::net::{IpAddr, Ipv4Addr};
    use std::rc::Rc;

    use rib_core::pool::LinPool;
    use rib_core::rib::config::{ProtocolConfig, MASTER_TABLE};
    use rib_core::test_types::{net, Recorder, RejectNets, SetAttr, SetPref};
    use rib_core::{
        Dest, EaId, Filter, FilterRoute, FilterVerdict, Preexport, ProtoState,
        ProtocolHooks, ProtocolId, ProtocolKind, Rib, RouteCandidate,
        RouteFilter, RouteSource, Rta, Scope, TableId,
    };

    struct RejectBlackholes;

    impl RouteFilter for RejectBlackholes {
        fn run(
            &self,
            route: &mut FilterRoute<'_>,
            pool: &mut LinPool,
        ) -> FilterVerdict {
            // Scratch memory, gone once the update is done.
            pool.alloc_copy(route.net().to_string().as_bytes());
            match route.attrs().dest {
                Dest::Blackhole => FilterVerdict::Reject,
                _ => FilterVerdict::Accept,
            }
        }

        fn name(&self) -> &str {
            "no-blackholes"
        }
    }

    struct Broken;

    impl RouteFilter for Broken {
        fn run(
            &self,
            _route: &mut FilterRoute<'_>,
            _pool: &mut LinPool,
        ) -> FilterVerdict {
            FilterVerdict::Error("division by zero".to_string())
        }
    }

    /// Refuses everything before the export filter gets to see it.
    struct Picky;

    impl ProtocolHooks for Picky {
        fn preexport(&self, _route: &FilterRoute<'_>) -> Preexport {
            Preexport::Reject
        }
    }

    fn router(proto: ProtocolId) -> Rta {
        Rta::new(
            proto,
            RouteSource::Static,
            Dest::Router {
                gw: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                iface: None,
            },
        )
    }

    fn setup() -> Result<(Rib, TableId), Box<dyn Error>> {
        crate::common::init();
        let rib = Rib::try_default()?;
        let table = rib.table_id(MASTER_TABLE)?;
        Ok((rib, table))
    }

    fn add(
        rib: &mut Rib,
        config: ProtocolConfig,
        hooks: Rc<dyn ProtocolHooks>,
    ) -> Result<ProtocolId, Box<dyn Error>> {
        let id = rib.add_protocol(config, hooks)?;
        rib.set_protocol_state(id, ProtoState::Up)?;
        Ok(id)
    }

    #[test]
    fn import_filter_rejects() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let bad = net("10.1.0.0/16");
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static)
                .with_import(Filter::custom(RejectNets(vec![bad]))),
            Rc::new(Recorder::new()),
        )?;
        let good = net("10.2.0.0/16");
        rib.update(table, bad, p, Some(RouteCandidate::new(router(p))))?;
        rib.update(table, good, p, Some(RouteCandidate::new(router(p))))?;

        let t = rib.table(table)?;
        assert!(t.find(&bad).is_none());
        assert!(t.best(&good).is_some());
        let stats = rib.protocol(p)?.stats();
        assert_eq!(stats.updates_received, 2);
        assert_eq!(stats.updates_filtered, 1);
        assert_eq!(stats.updates_accepted, 1);
        Ok(())
    }

    #[test]
    fn a_rejected_update_withdraws_the_old_route(
    ) -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let observer = Rc::new(Recorder::new());
        add(
            &mut rib,
            ProtocolConfig::new("kernel1", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::Accept),
            observer.clone(),
        )?;
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static)
                .with_import(Filter::custom(RejectBlackholes)),
            Rc::new(Recorder::new()),
        )?;
        let n = net("10.3.0.0/16");
        rib.update(table, n, p, Some(RouteCandidate::new(router(p))))?;
        assert!(rib.best_route(table, &n).is_some());
        assert!(rib.pool().peak() > 0);
        assert_eq!(rib.pool().allocated(), 0);

        let blackhole = Rta::new(p, RouteSource::Static, Dest::Blackhole);
        rib.update(table, n, p, Some(RouteCandidate::new(blackhole)))?;
        assert!(rib.best_route(table, &n).is_none());

        let seen = observer.take();
        assert_eq!(seen.len(), 2);
        assert!(seen[1].new.is_none());
        assert_eq!(rib.protocol(p)?.stats().updates_filtered, 1);
        assert_eq!(rib.protocol(p)?.stats().withdraws_accepted, 1);
        Ok(())
    }

    #[test]
    fn failing_filters_reject() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static)
                .with_import(Filter::custom(Broken)),
            Rc::new(Recorder::new()),
        )?;
        let n = net("10.4.0.0/16");
        rib.update(table, n, p, Some(RouteCandidate::new(router(p))))?;
        assert!(rib.best_route(table, &n).is_none());
        assert_eq!(rib.protocol(p)?.stats().updates_filtered, 1);
        Ok(())
    }

    #[test]
    fn import_filter_modifies() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let tag = EaId::new(ProtocolKind::Static, 1);
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static)
                .with_import(Filter::custom(SetAttr(tag, 42))),
            Rc::new(Recorder::new()),
        )?;
        let q = add(
            &mut rib,
            ProtocolConfig::new("static2", ProtocolKind::Static)
                .with_import(Filter::custom(SetPref(5))),
            Rc::new(Recorder::new()),
        )?;
        let n = net("10.5.0.0/16");
        rib.update(table, n, p, Some(RouteCandidate::new(router(p))))?;
        rib.update(table, n, q, Some(RouteCandidate::new(router(q))))?;

        let routes = rib.table(table)?.routes(&n);
        assert_eq!(routes.len(), 2);
        assert_eq!(rib.rta(routes[0].attrs).eattrs.get_int(tag, 0), 42);
        assert_eq!(routes[1].pref, 5);
        assert_eq!(rib.cache().len(), 2);
        Ok(())
    }

    #[test]
    fn export_filter_modifies_a_copy() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let tag = EaId::new(ProtocolKind::Kernel, 2);
        let observer = Rc::new(Recorder::new());
        add(
            &mut rib,
            ProtocolConfig::new("kernel1", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::custom(SetAttr(tag, 7))),
            observer.clone(),
        )?;
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static),
            Rc::new(Recorder::new()),
        )?;
        let n = net("10.6.0.0/16");
        rib.update(table, n, p, Some(RouteCandidate::new(router(p))))?;

        let seen = observer.take();
        assert_eq!(seen[0].new.as_ref().unwrap().eattrs.get_int(tag, 0), 7);
        let best = rib.best_route(table, &n).unwrap();
        assert!(rib.rta(best.attrs).eattrs.find(tag).is_none());
        // The exported copy is gone after the notification.
        assert_eq!(rib.cache().len(), 1);
        Ok(())
    }

    #[test]
    fn export_is_refused() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let hidden = net("10.7.0.0/16");
        let observer = Rc::new(Recorder::new());
        let o = add(
            &mut rib,
            ProtocolConfig::new("kernel1", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::custom(RejectNets(vec![hidden]))),
            observer.clone(),
        )?;
        let wide = Rc::new(Recorder::new());
        add(
            &mut rib,
            ProtocolConfig::new("kernel2", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::Accept)
                .with_min_scope(Scope::Universe),
            wide.clone(),
        )?;
        add(
            &mut rib,
            ProtocolConfig::new("kernel3", ProtocolKind::Kernel)
                .with_table(MASTER_TABLE)
                .with_export(Filter::Accept),
            Rc::new(Picky),
        )?;
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static),
            Rc::new(Recorder::new()),
        )?;

        let shown = net("10.8.0.0/16");
        rib.update(table, hidden, p, Some(RouteCandidate::new(router(p))))?;
        rib.update(table, shown, p, Some(RouteCandidate::new(router(p))))?;
        let site = router(p).with_scope(Scope::Site);
        let local = net("10.9.0.0/16");
        rib.update(table, local, p, Some(RouteCandidate::new(site)))?;

        let seen = observer.take();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|c| c.net != hidden));
        let hook = rib.hooks_of(o)[0];
        let stats = rib.hook(hook).unwrap().stats();
        assert_eq!(stats.updates_received, 3);
        assert_eq!(stats.updates_rejected, 1);
        assert_eq!(stats.updates_accepted, 2);

        let seen = wide.take();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|c| c.net != local));
        Ok(())
    }

    #[test]
    fn invalid_networks_are_dropped() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let p = add(
            &mut rib,
            ProtocolConfig::new("static1", ProtocolKind::Static),
            Rc::new(Recorder::new()),
        )?;
        let strict = add(
            &mut rib,
            ProtocolConfig::new("bgp1", ProtocolKind::Bgp)
                .with_min_scope(Scope::Universe),
            Rc::new(Recorder::new()),
        )?;

        let host_bits = net("10.0.0.1/24");
        rib.update(table, host_bits, p, Some(RouteCandidate::new(router(p))))?;
        rib.update(table, host_bits, p, None)?;
        let private = net("10.10.0.0/16");
        let candidate = RouteCandidate::new(router(strict));
        rib.update(table, private, strict, Some(candidate))?;
        let default = net("0.0.0.0/0");
        let candidate = RouteCandidate::new(router(strict));
        rib.update(table, default, strict, Some(candidate))?;

        let t = rib.table(table)?;
        assert!(t.find(&host_bits).is_none());
        assert!(t.find(&private).is_none());
        assert!(t.best(&default).is_some());
        let stats = rib.protocol(p)?.stats();
        assert_eq!(stats.updates_invalid, 1);
        assert_eq!(stats.withdraws_invalid, 1);
        assert_eq!(rib.protocol(strict)?.stats().updates_invalid, 1);
        Ok(())
    }

    #[test]
    fn protocols_that_are_not_up_are_ignored() -> Result<(), Box<dyn Error>> {
        let (mut rib, table) = setup()?;
        let p = rib.add_protocol(
            ProtocolConfig::new("static1", ProtocolKind::Static),
            Rc::new(Recorder::new()),
        )?;
        rib.set_protocol_state(p, ProtoState::Starting)?;
        let n = net("10.11.0.0/16");
        rib.update(table, n, p, Some(RouteCandidate::new(router(p))))?;
        assert!(rib.table(table)?.find(&n).is_none());
        assert_eq!(rib.protocol(p)?.stats().updates_filtered, 1);
        Ok(())
    }
}
