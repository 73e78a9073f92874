//! Scripted walkthrough of one pool's life: deposits, yield, a
//! rolling line that defaults, and a fixed-term loan repaid in full.

use colored::Colorize;
use tidepool_engine::{
    FeeSource, GovParams, Pool, PoolConfig, PositionKey, RollingStatus, EPOCH_SECS,
};

fn key(n: u64) -> PositionKey {
    PositionKey::from_u64(n)
}

fn heading(text: &str) {
    println!();
    println!("{}", text.bold().bright_cyan());
}

pub fn run() -> anyhow::Result<()> {
    let mut pool = Pool::new(PoolConfig::relaxed(), 0);
    let gov = GovParams {
        treasury: Some(key(900)),
        foundation: Some(key(901)),
        ..GovParams::relaxed()
    };
    let err = |e| anyhow::anyhow!("ledger error: {e:?}");

    heading("Two depositors fund the pool");
    pool.deposit(key(1), 10_000).map_err(err)?;
    pool.deposit(key(2), 10_000).map_err(err)?;
    println!("total deposits {}", pool.total_deposits);

    heading("Yield arrives and splits pro rata");
    pool.accrue_fee(1_000, FeeSource::Yield).map_err(err)?;
    for id in [1, 2] {
        println!(
            "position {} pending yield {}",
            id,
            pool.pending_yield(key(id)).map_err(err)?
        );
    }

    heading("Position 1 opens a rolling credit line and stops paying");
    pool.open_rolling(key(1), 5_000, 1_200, EPOCH_SECS, 0, 0).map_err(err)?;
    println!(
        "drawn 5000; penalty base {}",
        pool.position(key(1)).map(|p| p.rolling.principal_at_open).unwrap_or(0)
    );
    let mut clock = 0;
    loop {
        clock += EPOCH_SECS;
        let status = pool.rolling_status(key(1), clock, &gov);
        println!("epoch {}: {:?}", clock / EPOCH_SECS, status);
        if status == RollingStatus::Penalizable {
            break;
        }
    }

    heading("Anyone may now enforce the default");
    let outcome = pool.penalize_rolling(key(1), clock, &gov).map_err(err)?;
    println!("seized {} (debt {} + penalty {})",
        outcome.total_seized, outcome.outstanding_debt, outcome.penalty_applied);
    println!("{} enforcer {}  treasury {}  active credit {}  depositors {}",
        "split:".bright_yellow(),
        outcome.enforcer_share,
        outcome.treasury_share,
        outcome.active_credit_share,
        outcome.fee_index_share,
    );

    heading("Position 2 takes a fixed-term loan and repays it");
    let id = pool.open_fixed(key(2), 2_000, 0, 0, clock).map_err(err)?;
    let expiry = pool.fixed_loan(key(2), id).map(|l| l.expiry).unwrap_or(0);
    println!("loan {} expires at epoch {}", id, expiry / EPOCH_SECS);
    pool.repay_fixed(key(2), id, 2_000).map_err(err)?;
    println!("repaid in full; loan closed");

    heading("Maintenance runs one epoch later");
    let out = pool
        .enforce_maintenance(clock + EPOCH_SECS, &gov, u128::MAX)
        .map_err(err)?;
    println!(
        "epochs {}  accrued {}  paid {}",
        out.epochs, out.fee_accrued, out.paid
    );

    heading("Final state");
    for id in [1u64, 2] {
        pool.settle(key(id)).map_err(err)?;
        let pos = pool.position(key(id)).ok_or_else(|| anyhow::anyhow!("missing position"))?;
        println!(
            "position {}: principal {}  yield {}",
            id, pos.principal, pos.accrued_yield
        );
    }
    println!("pool total {}  tracked {}", pool.total_deposits, pool.tracked_balance);
    println!("{}", "done".bright_green());
    Ok(())
}
