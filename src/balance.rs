use std::collections::HashMap;

use crate::error::LedgerError;
use crate::models::{Balance, Group, Member, MemberId, MemberPosition};

/// Amounts within one cent of each other are treated as equal, both when
/// validating splits and when deciding whether a pair is settled.
pub const EPSILON: f64 = 0.01;

/// Square table of who owes whom, built from a group's full history.
///
/// `owed[x][y]` is how much member `x` owes member `y`, net. Every entry is
/// written together with its mirror, so `owed[x][y] == -owed[y][x]` holds
/// after any sequence of records.
#[derive(Debug, Clone)]
pub struct PairwiseLedger<'a> {
    members: &'a [Member],
    index: HashMap<MemberId, usize>,
    owed: Vec<Vec<f64>>,
}

impl<'a> PairwiseLedger<'a> {
    pub fn from_group(group: &'a Group) -> Result<Self, LedgerError> {
        let members = group.members.as_slice();
        let index = members
            .iter()
            .enumerate()
            .map(|(position, member)| (member.id, position))
            .collect();
        let mut ledger = PairwiseLedger {
            members,
            index,
            owed: vec![vec![0.0; members.len()]; members.len()],
        };

        // The payer covered everyone else's share. Their own share needs no entry.
        for expense in &group.expenses {
            let payer = ledger.position(expense.paid_by)?;
            for participant in &expense.participants {
                let debtor = ledger.position(participant.member_id)?;
                if debtor != payer {
                    ledger.record(debtor, payer, participant.amount);
                }
            }
        }

        // A settlement pays back debt, which is the same as the payee now owing the payer.
        for settlement in &group.settlements {
            let payer = ledger.position(settlement.paid_by)?;
            let payee = ledger.position(settlement.paid_to)?;
            ledger.record(payee, payer, settlement.amount);
        }

        Ok(ledger)
    }

    fn position(&self, id: MemberId) -> Result<usize, LedgerError> {
        self.index
            .get(&id)
            .copied()
            .ok_or(LedgerError::UnknownMember(id))
    }

    fn record(&mut self, debtor: usize, creditor: usize, amount: f64) {
        self.owed[debtor][creditor] += amount;
        self.owed[creditor][debtor] -= amount;
    }

    /// Net amount `debtor` owes `creditor`; negative when the debt runs the other way.
    pub fn net(&self, debtor: MemberId, creditor: MemberId) -> Option<f64> {
        let d = *self.index.get(&debtor)?;
        let c = *self.index.get(&creditor)?;
        Some(self.owed[d][c])
    }

    /// One entry per unsettled pair, in member-pair order.
    pub fn balances(&self) -> Vec<Balance> {
        let mut balances = Vec::new();
        for (i, a) in self.members.iter().enumerate() {
            for (j, b) in self.members.iter().enumerate().skip(i + 1) {
                let net = self.owed[i][j];
                if net > EPSILON {
                    balances.push(Balance {
                        from: a.id,
                        to: b.id,
                        amount: net,
                    });
                } else if net < -EPSILON {
                    balances.push(Balance {
                        from: b.id,
                        to: a.id,
                        amount: -net,
                    });
                }
            }
        }
        balances
    }
}

/// Computes who owes whom by netting every pair of members.
///
/// Balances are rebuilt from the whole expense and settlement history on each
/// call. Debts are not chained across more than two people.
pub fn compute_balances(group: &Group) -> Result<Vec<Balance>, LedgerError> {
    Ok(PairwiseLedger::from_group(group)?.balances())
}

/// Each member's overall position across all counterparties, in member order.
pub fn net_positions(group: &Group) -> Result<Vec<MemberPosition>, LedgerError> {
    let balances = compute_balances(group)?;
    let positions = group
        .members
        .iter()
        .map(|member| {
            let net = balances
                .iter()
                .map(|b| {
                    if b.to == member.id {
                        b.amount
                    } else if b.from == member.id {
                        -b.amount
                    } else {
                        0.0
                    }
                })
                .sum();
            MemberPosition {
                member_id: member.id,
                net,
            }
        })
        .collect();
    Ok(positions)
}
